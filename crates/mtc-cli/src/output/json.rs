use mtc_core::error::MtcError;
use serde::Serialize;

pub fn print<T: Serialize>(value: &T) -> Result<(), MtcError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
