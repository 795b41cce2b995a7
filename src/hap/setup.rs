//! Pairing setup codes.
//!
//! HomeKit pairs with an 8-digit setup code formatted `DDD-DD-DDD`, plus a
//! 4-character setup id used in the `X-HM://` setup URI that QR codes encode.

use crate::error::{BridgeError, Result};
use rand::Rng;

/// Codes the protocol forbids because they are trivially guessable.
const TRIVIAL_PINCODES: [&str; 12] = [
    "000-00-000",
    "111-11-111",
    "222-22-222",
    "333-33-333",
    "444-44-444",
    "555-55-555",
    "666-66-666",
    "777-77-777",
    "888-88-888",
    "999-99-999",
    "123-45-678",
    "876-54-321",
];

const SETUP_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Check that `pincode` is `DDD-DD-DDD` and not a trivial code.
pub fn validate_pincode(pincode: &str) -> Result<()> {
    let well_formed = pincode.len() == 10
        && pincode.char_indices().all(|(i, c)| match i {
            3 | 6 => c == '-',
            _ => c.is_ascii_digit(),
        });
    if !well_formed {
        return Err(BridgeError::Config(format!(
            "pincode {pincode:?} must have the format DDD-DD-DDD"
        )));
    }
    if TRIVIAL_PINCODES.contains(&pincode) {
        return Err(BridgeError::Config(format!(
            "pincode {pincode} is too simple"
        )));
    }
    Ok(())
}

/// Generate a random, non-trivial pincode.
pub fn generate_pincode() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let pincode = format!(
            "{:03}-{:02}-{:03}",
            rng.gen_range(0..1000),
            rng.gen_range(0..100),
            rng.gen_range(0..1000)
        );
        if !TRIVIAL_PINCODES.contains(&pincode.as_str()) {
            return pincode;
        }
    }
}

/// Generate a random 4-character setup id.
pub fn generate_setup_id() -> String {
    let mut rng = rand::thread_rng();
    (0..4)
        .map(|_| SETUP_ID_ALPHABET[rng.gen_range(0..SETUP_ID_ALPHABET.len())] as char)
        .collect()
}

/// Build the `X-HM://` setup URI for an IP accessory.
///
/// Payload layout (64 bit): category in bits 31.., IP transport flag at
/// bit 28, setup code in the low 27 bits; base36-encoded and zero-padded
/// to nine characters, followed by the setup id.
pub fn setup_uri(pincode: &str, setup_id: &str, category: u16) -> Result<String> {
    validate_pincode(pincode)?;
    let code: u64 = pincode
        .replace('-', "")
        .parse()
        .map_err(|_| BridgeError::Config(format!("pincode {pincode:?} is not numeric")))?;
    let payload = (u64::from(category) << 31) | (1 << 28) | code;
    Ok(format!("X-HM://{:0>9}{}", base36(payload), setup_id))
}

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(SETUP_ID_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pincode() {
        assert!(validate_pincode("031-45-154").is_ok());
        assert!(validate_pincode("03145154").is_err());
        assert!(validate_pincode("031-45-15a").is_err());
        assert!(validate_pincode("0314-5-154").is_err());
        assert!(validate_pincode("123-45-678").is_err());
        assert!(validate_pincode("111-11-111").is_err());
    }

    #[test]
    fn test_generated_pincode_is_valid() {
        for _ in 0..100 {
            let pincode = generate_pincode();
            assert!(validate_pincode(&pincode).is_ok(), "{pincode}");
        }
    }

    #[test]
    fn test_generated_setup_id() {
        let id = generate_setup_id();
        assert_eq!(id.len(), 4);
        assert!(id.bytes().all(|b| SETUP_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_setup_uri() {
        let uri = setup_uri("031-45-154", "7OSX", 2).unwrap();
        assert!(uri.starts_with("X-HM://"));
        assert!(uri.ends_with("7OSX"));
        assert_eq!(uri.len(), "X-HM://".len() + 9 + 4);
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "Z");
        assert_eq!(base36(36), "10");
    }
}
