//! Composite EPC payload: `plate || 0xFF || packed digits || [0xF0]`.
//!
//! The plate is stored as raw ASCII without padding. The record id is packed
//! two decimal digits per byte, high nibble first; an odd digit count leaves
//! `0xF` in the last low nibble. A single `0xF0` byte is appended when needed
//! so the EPC always covers whole 16-bit words.

use crate::utils::error::{Result, RfidError};

pub const SEPARATOR: u8 = 0xFF;
pub const TAIL_PAD: u8 = 0xF0;
pub const CLEARED_PLATE: &str = "0000000";
pub const CLEARED_RECORD_ID: &str = "000000";

const NO_DIGIT: u8 = 0x0F;
const MAX_PLATE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateRaw(Vec<u8>);

impl PlateRaw {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedDigits(Vec<u8>);

impl PackedDigits {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Plate and record id read back from a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPayload {
    pub plate: String,
    pub record_id: String,
}

impl DecodedPayload {
    pub fn is_cleared(&self) -> bool {
        is_cleared(Some(&self.plate), Some(&self.record_id))
    }
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7E).contains(&b)
}

pub fn encode_plate(text: &str) -> Result<PlateRaw> {
    let plate = text.trim();
    let valid = matches!(plate.len(), 7 | 8) && plate.bytes().all(is_printable);
    if !valid {
        return Err(RfidError::InvalidPlate {
            value: text.to_string(),
        });
    }
    Ok(PlateRaw(plate.as_bytes().to_vec()))
}

pub fn encode_digits(text: &str) -> Result<PackedDigits> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RfidError::InvalidRecordId {
            value: text.to_string(),
        });
    }
    Ok(PackedDigits(pack(text.as_bytes())))
}

// caller guarantees ASCII digits
fn pack(digits: &[u8]) -> Vec<u8> {
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0] - b'0';
            let lo = pair.get(1).map(|d| d - b'0').unwrap_or(NO_DIGIT);
            (hi << 4) | lo
        })
        .collect()
}

pub fn build(plate: &PlateRaw, digits: &PackedDigits) -> Vec<u8> {
    let total = plate.0.len() + 1 + digits.0.len();
    let mut payload = Vec::with_capacity(total + 1);
    payload.extend_from_slice(&plate.0);
    payload.push(SEPARATOR);
    payload.extend_from_slice(&digits.0);
    if total % 2 == 1 {
        payload.push(TAIL_PAD);
    }
    payload
}

/// Validates and packs a plate/record id pair into a writable payload.
pub fn build_identity(plate: &str, record_id: &str) -> Result<Vec<u8>> {
    let plate = encode_plate(plate)?;
    let digits = encode_digits(record_id)?;
    Ok(build(&plate, &digits))
}

/// Payload written on removal.
pub fn cleared_payload() -> Vec<u8> {
    build(
        &PlateRaw(CLEARED_PLATE.as_bytes().to_vec()),
        &PackedDigits(pack(CLEARED_RECORD_ID.as_bytes())),
    )
}

pub fn parse(epc_hex: &str) -> Result<DecodedPayload> {
    decode(epc_hex, true)
}

/// Like [`parse`], but a non-decimal nibble in the id region reads as `?`.
pub fn inspect(epc_hex: &str) -> Result<DecodedPayload> {
    decode(epc_hex, false)
}

fn decode(epc_hex: &str, strict: bool) -> Result<DecodedPayload> {
    let epc = hex_to_bytes(epc_hex);
    if epc.len() < 2 {
        return Err(RfidError::InvalidPayload {
            reason: format!("EPC too short ({} bytes)", epc.len()),
        });
    }

    let sep = epc
        .iter()
        .position(|&b| b == SEPARATOR)
        .filter(|&i| (1..=MAX_PLATE_LEN).contains(&i))
        .ok_or_else(|| RfidError::InvalidPayload {
            reason: "no plate separator within the first 9 bytes".to_string(),
        })?;

    let plate = decode_plate(&epc[..sep]);

    let mut id_region = &epc[sep + 1..];
    if let Some((&TAIL_PAD, rest)) = id_region.split_last() {
        id_region = rest;
    }

    Ok(DecodedPayload {
        plate,
        record_id: unpack(id_region, strict)?,
    })
}

// Lenient on purpose: a plate region with any non-printable byte reads as empty.
fn decode_plate(raw: &[u8]) -> String {
    if raw.iter().all(|&b| is_printable(b)) {
        raw.iter().map(|&b| char::from(b)).collect()
    } else {
        String::new()
    }
}

fn unpack(packed: &[u8], strict: bool) -> Result<String> {
    let mut digits = String::with_capacity(packed.len() * 2);
    let last = packed.len().saturating_sub(1);

    for (i, &byte) in packed.iter().enumerate() {
        push_digit(&mut digits, byte >> 4, strict)?;
        let lo = byte & 0x0F;
        if lo == NO_DIGIT && i == last {
            break;
        }
        push_digit(&mut digits, lo, strict)?;
    }
    Ok(digits)
}

fn push_digit(out: &mut String, nibble: u8, strict: bool) -> Result<()> {
    if nibble > 9 && !strict {
        out.push('?');
        return Ok(());
    }
    if nibble > 9 {
        return Err(RfidError::InvalidPayload {
            reason: format!("non-decimal nibble 0x{:X} in record id", nibble),
        });
    }
    out.push(char::from(b'0' + nibble));
    Ok(())
}

/// Each side counts as cleared when blank or equal to its sentinel.
pub fn is_cleared(plate: Option<&str>, record_id: Option<&str>) -> bool {
    let plate_cleared = plate
        .map(|p| p.trim().is_empty() || p == CLEARED_PLATE)
        .unwrap_or(true);
    let id_cleared = record_id
        .map(|d| d.trim().is_empty() || d == CLEARED_RECORD_ID)
        .unwrap_or(true);
    plate_cleared && id_cleared
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Drops anything that is not a hex digit and left-pads an odd count with `0`.
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    let mut nibbles: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    if nibbles.len() % 2 == 1 {
        nibbles.insert(0, 0);
    }
    nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(plate: &str, digits: &str) -> DecodedPayload {
        let payload = build_identity(plate, digits).unwrap();
        parse(&to_hex(&payload)).unwrap()
    }

    #[test]
    fn test_known_layout() {
        let payload = build_identity("34ABC123", "778812").unwrap();
        assert_eq!(to_hex(&payload), "3334414243313233FF778812");
    }

    #[test]
    fn test_odd_digit_count_round_trip() {
        let payload = build(
            &encode_plate("34AB123").unwrap(),
            &encode_digits("12345").unwrap(),
        );
        // 7 + 1 + 3 bytes is odd, so one tail byte follows
        assert_eq!(to_hex(&payload), "33344142313233FF12345FF0");

        let decoded = parse(&to_hex(&payload)).unwrap();
        assert_eq!(decoded.plate, "34AB123");
        assert_eq!(decoded.record_id, "12345");
    }

    #[test]
    fn test_round_trip_plate_and_digit_lengths() {
        let plates = ["34AB123", "06 ZZ 99", "~!@#$%^&", "A B C D"];
        let source = "98765432109876543210";
        for plate in plates {
            for n in 1..=20 {
                let digits = &source[..n];
                let payload = build_identity(plate, digits).unwrap();
                assert_eq!(payload.len() % 2, 0, "odd payload for {plate}/{digits}");

                let decoded = parse(&to_hex(&payload)).unwrap();
                assert_eq!(decoded.plate, plate.trim());
                assert_eq!(decoded.record_id, digits);
            }
        }
    }

    #[test]
    fn test_encode_plate_rules() {
        assert!(encode_plate("  34AB123  ").is_ok());
        assert!(encode_plate("34AB12").is_err());
        assert!(encode_plate("34ABC1234").is_err());
        assert!(encode_plate("34ÇB123").is_err());
        assert!(encode_plate("34AB\t123").is_err());
        assert!(encode_plate("").is_err());
    }

    #[test]
    fn test_encode_digits_rules() {
        assert_eq!(encode_digits("7").unwrap().as_bytes(), &[0x7F]);
        assert_eq!(encode_digits("0042").unwrap().as_bytes(), &[0x00, 0x42]);
        assert!(matches!(
            encode_digits(""),
            Err(RfidError::InvalidRecordId { .. })
        ));
        assert!(encode_digits("12a4").is_err());
        assert!(encode_digits(" 12").is_err());
    }

    #[test]
    fn test_parse_requires_separator_in_range() {
        // no 0xFF at all
        assert!(parse("3334414243313233343536").is_err());
        // separator at index 0
        assert!(parse("FF3334414243").is_err());
        // separator at index 9
        assert!(parse("333441424331323334FF12").is_err());
        // too short
        assert!(parse("FF").is_err());
    }

    #[test]
    fn test_parse_without_id_bytes() {
        let decoded = parse("3334414243313233FF").unwrap();
        assert_eq!(decoded.plate, "34ABC123");
        assert_eq!(decoded.record_id, "");

        // a lone tail pad is padding, not an id
        let decoded = parse("33344142313233FFF0").unwrap();
        assert_eq!(decoded.record_id, "");
    }

    #[test]
    fn test_non_printable_plate_reads_as_empty() {
        let decoded = parse("3334004243313233FF1234").unwrap();
        assert_eq!(decoded.plate, "");
        assert_eq!(decoded.record_id, "1234");

        let decoded = parse("0000000000000000FF1234").unwrap();
        assert_eq!(decoded.plate, "");
    }

    #[test]
    fn test_non_decimal_nibble_is_invalid() {
        assert!(matches!(
            parse("33344142313233FF1A34"),
            Err(RfidError::InvalidPayload { .. })
        ));
        // 0xF only allowed as the final low nibble
        assert!(parse("33344142313233FF1F34").is_err());
    }

    #[test]
    fn test_inspect_keeps_plate_with_damaged_id() {
        let hex = "3334414243313233FF1A34F0";
        assert!(parse(hex).is_err());

        let decoded = inspect(hex).unwrap();
        assert_eq!(decoded.plate, "34ABC123");
        assert_eq!(decoded.record_id, "1?34");
        assert!(!decoded.is_cleared());

        // separator rules still apply
        assert!(inspect("3334414243313233343536").is_err());
        assert_eq!(
            inspect(&to_hex(&cleared_payload())).unwrap().record_id,
            CLEARED_RECORD_ID
        );
    }

    #[test]
    fn test_cleared_payload() {
        let payload = cleared_payload();
        assert_eq!(to_hex(&payload), "30303030303030FF000000F0");

        let decoded = parse(&to_hex(&payload)).unwrap();
        assert_eq!(decoded.plate, CLEARED_PLATE);
        assert_eq!(decoded.record_id, CLEARED_RECORD_ID);
        assert!(decoded.is_cleared());
    }

    #[test]
    fn test_is_cleared() {
        assert!(is_cleared(Some("0000000"), Some("000000")));
        assert!(is_cleared(Some(""), Some("")));
        assert!(is_cleared(None, None));
        assert!(is_cleared(Some("0000000"), None));
        assert!(is_cleared(Some("  "), Some("000000")));
        assert!(!is_cleared(Some("34AB123"), Some("000000")));
        assert!(!is_cleared(Some("0000000"), Some("12")));
        assert!(!is_cleared(Some("00000000"), Some("000000")));
    }

    #[test]
    fn test_hex_helpers_are_lenient() {
        assert_eq!(to_hex(&[0x0A, 0xFF, 0x00]), "0AFF00");
        assert_eq!(hex_to_bytes("0a-ff 00"), vec![0x0A, 0xFF, 0x00]);
        assert_eq!(hex_to_bytes("ABC"), vec![0x0A, 0xBC]);
        assert_eq!(hex_to_bytes("zz"), Vec::<u8>::new());
    }

    #[test]
    fn test_roundtrip_helper_trims_plate() {
        let decoded = roundtrip(" 34AB123 ", "1");
        assert_eq!(decoded.plate, "34AB123");
        assert_eq!(decoded.record_id, "1");
    }
}
