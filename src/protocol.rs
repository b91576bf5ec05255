//! Wire protocol codec
//!
//! Angles travel as integers in `[0, precision)`. The top
//! [`RESERVED_CODES`] values of the `message_bytes`-wide range are reserved
//! for conditions that are not angles:
//!
//! ```text
//!  0 ............ precision-1 | unused | max-10 ... max-4  max-3  max-2  max-1
//!  angle buckets                         (future)  LOST   ERROR  WRONG  NOT_FOUND
//! ```

use crate::config::NetworkConfig;
use crate::constants::RESERVED_CODES;
use crate::error::ProtocolError;

/// Conditions encoded in the reserved range, counted down from `max - 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedCode {
    NotFound,
    WrongOrder,
    Error,
    LostConnection,
}

impl ReservedCode {
    const ALL: [ReservedCode; 4] = [
        ReservedCode::NotFound,
        ReservedCode::WrongOrder,
        ReservedCode::Error,
        ReservedCode::LostConnection,
    ];

    /// Distance below the top of the range
    fn slot(self) -> u64 {
        match self {
            ReservedCode::NotFound => 1,
            ReservedCode::WrongOrder => 2,
            ReservedCode::Error => 3,
            ReservedCode::LostConnection => 4,
        }
    }

    /// Code relative to the start of the reserved range, as stored in the
    /// result log (`NOT_FOUND` is 9)
    pub fn log_code(self) -> u64 {
        RESERVED_CODES - self.slot()
    }

    fn from_log_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.log_code() == code)
    }
}

/// A per-frame outcome on its way to the transport
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// Ball angle in degrees
    Angle(f64),
    NotFound,
    WrongOrder,
}

/// An encoded wire value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    pub value: u64,
    pub is_error: bool,
}

/// A wire value read back for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    /// Angle in degrees, `[0, 360)`
    Angle(f64),
    /// Code relative to the start of the reserved range
    Error(u64),
}

impl Decoded {
    pub fn reserved(&self) -> Option<ReservedCode> {
        match self {
            Decoded::Angle(_) => None,
            Decoded::Error(code) => ReservedCode::from_log_code(*code),
        }
    }
}

/// Maps angles to fixed-width integers and back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCodec {
    precision: u64,
    message_bytes: u8,
    max_precision: u128,
    send_errors: bool,
}

impl ProtocolCodec {
    pub fn new(precision: u64, message_bytes: u8, send_errors: bool) -> Result<Self, ProtocolError> {
        if !(1..=8).contains(&message_bytes) {
            return Err(ProtocolError::InvalidMessageBytes(message_bytes));
        }
        if precision == 0 {
            return Err(ProtocolError::ZeroPrecision);
        }
        let max_precision = 1u128 << (8 * message_bytes as u32);
        if precision as u128 + RESERVED_CODES as u128 > max_precision {
            return Err(ProtocolError::InsufficientMessageBytes {
                precision,
                message_bytes,
            });
        }
        Ok(Self {
            precision,
            message_bytes,
            max_precision,
            send_errors,
        })
    }

    pub fn from_config(conf: &NetworkConfig) -> Result<Self, ProtocolError> {
        Self::new(conf.precision, conf.message_bytes, conf.send_errors)
    }

    pub fn precision(&self) -> u64 {
        self.precision
    }

    pub fn message_bytes(&self) -> u8 {
        self.message_bytes
    }

    /// `256 ^ message_bytes`
    pub fn max_precision(&self) -> u128 {
        self.max_precision
    }

    pub fn send_errors(&self) -> bool {
        self.send_errors
    }

    /// Largest value a message can carry
    fn max_value(&self) -> u64 {
        (self.max_precision - 1) as u64
    }

    /// First value of the reserved range
    pub fn reserved_floor(&self) -> u64 {
        (self.max_precision - RESERVED_CODES as u128) as u64
    }

    /// Wire value of a reserved code
    pub fn code(&self, code: ReservedCode) -> u64 {
        self.max_value() - (code.slot() - 1)
    }

    pub fn is_reserved(&self, value: u64) -> bool {
        value >= self.reserved_floor()
    }

    /// Encode a raw value.
    ///
    /// Values at or above the reserved floor are error codes and pass through
    /// unchanged, or are suppressed (`None`) when error transmission is off.
    /// Everything else is an angle in degrees, rescaled to `precision`
    /// buckets and wrapped into `[0, precision)`.
    pub fn encode(&self, value: f64) -> Option<Encoded> {
        if value.is_nan() || value >= self.reserved_floor() as f64 {
            let code = if value.is_nan() || value > self.max_value() as f64 {
                self.code(ReservedCode::Error)
            } else {
                value as u64
            };
            return self.error(code);
        }
        if value.is_infinite() {
            return self.error(self.code(ReservedCode::Error));
        }

        let precision = self.precision as f64;
        let scaled = if self.precision != 360 {
            (value / 360.0 * precision).floor()
        } else {
            value
        };
        let wrapped = scaled.rem_euclid(precision).floor() as u64;
        // rem_euclid may round up to `precision` for tiny negative inputs
        let wrapped = if wrapped >= self.precision { 0 } else { wrapped };
        Some(Encoded {
            value: wrapped,
            is_error: false,
        })
    }

    /// Encode a reserved code, `None` when error transmission is off
    pub fn encode_code(&self, code: ReservedCode) -> Option<Encoded> {
        self.error(self.code(code))
    }

    pub fn encode_signal(&self, signal: Signal) -> Option<Encoded> {
        match signal {
            Signal::Angle(angle) => self.encode(angle),
            Signal::NotFound => self.encode_code(ReservedCode::NotFound),
            Signal::WrongOrder => self.encode_code(ReservedCode::WrongOrder),
        }
    }

    fn error(&self, value: u64) -> Option<Encoded> {
        self.send_errors.then_some(Encoded {
            value,
            is_error: true,
        })
    }

    /// Reverse the rescale of [`encode`](Self::encode) for the result log
    pub fn decode(&self, value: u64) -> Decoded {
        if self.is_reserved(value) {
            return Decoded::Error(value - self.reserved_floor());
        }
        if self.precision == 360 {
            Decoded::Angle(value as f64)
        } else {
            Decoded::Angle(value as f64 * 360.0 / self.precision as f64)
        }
    }
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self {
            precision: crate::constants::DEFAULT_PRECISION,
            message_bytes: crate::constants::DEFAULT_MESSAGE_BYTES,
            max_precision: 1u128 << (8 * crate::constants::DEFAULT_MESSAGE_BYTES as u32),
            send_errors: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> ProtocolCodec {
        ProtocolCodec::new(360, 2, true).unwrap()
    }

    #[test]
    fn test_reserved_codes() {
        let codec = codec();
        assert_eq!(codec.max_precision(), 65536);
        assert_eq!(codec.code(ReservedCode::NotFound), 65535);
        assert_eq!(codec.code(ReservedCode::WrongOrder), 65534);
        assert_eq!(codec.code(ReservedCode::Error), 65533);
        assert_eq!(codec.code(ReservedCode::LostConnection), 65532);
        assert_eq!(ReservedCode::NotFound.log_code(), 9);
        assert_eq!(ReservedCode::LostConnection.log_code(), 6);
    }

    #[test]
    fn test_wraps_angles() {
        let codec = codec();
        assert_eq!(codec.encode(-10.0), Some(Encoded { value: 350, is_error: false }));
        assert_eq!(codec.encode(370.0), Some(Encoded { value: 10, is_error: false }));
        assert_eq!(codec.encode(0.0).unwrap().value, 0);
        assert_eq!(codec.encode(359.9).unwrap().value, 359);
        assert_eq!(codec.encode(-10.5).unwrap().value, 349);
    }

    #[test]
    fn test_reserved_passthrough() {
        let codec = codec();
        assert_eq!(codec.encode(65535.0), Some(Encoded { value: 65535, is_error: true }));
        assert_eq!(
            codec.encode_signal(Signal::NotFound),
            Some(Encoded { value: 65535, is_error: true })
        );
        assert_eq!(
            codec.encode_signal(Signal::WrongOrder),
            Some(Encoded { value: 65534, is_error: true })
        );
    }

    #[test]
    fn test_errors_suppressed_when_disabled() {
        let codec = ProtocolCodec::new(360, 2, false).unwrap();
        assert_eq!(codec.encode(65535.0), None);
        assert_eq!(codec.encode_signal(Signal::NotFound), None);
        assert_eq!(codec.encode_signal(Signal::WrongOrder), None);
        assert_eq!(codec.encode(-10.0).unwrap().value, 350);
    }

    #[test]
    fn test_non_finite_is_error() {
        let codec = codec();
        assert_eq!(codec.encode(f64::NAN).unwrap().value, codec.code(ReservedCode::Error));
        assert_eq!(codec.encode(f64::NEG_INFINITY).unwrap().value, codec.code(ReservedCode::Error));
        assert_eq!(codec.encode(1e12).unwrap().value, codec.code(ReservedCode::Error));
    }

    #[test]
    fn test_rescale() {
        let codec = ProtocolCodec::new(3600, 2, true).unwrap();
        assert_eq!(codec.encode(12.34).unwrap().value, 123);
        assert_eq!(codec.encode(-0.05).unwrap().value, 3599);
        match codec.decode(123) {
            Decoded::Angle(a) => assert!((a - 12.3).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_errors() {
        let codec = codec();
        assert_eq!(codec.decode(65535), Decoded::Error(9));
        assert_eq!(codec.decode(65535).reserved(), Some(ReservedCode::NotFound));
        assert_eq!(codec.decode(65534).reserved(), Some(ReservedCode::WrongOrder));
        assert_eq!(codec.decode(42), Decoded::Angle(42.0));
    }

    #[test]
    fn test_construction_checks_capacity() {
        assert!(matches!(
            ProtocolCodec::new(250, 1, true),
            Err(ProtocolError::InsufficientMessageBytes { precision: 250, message_bytes: 1 })
        ));
        assert!(ProtocolCodec::new(246, 1, true).is_ok());
        assert!(matches!(ProtocolCodec::new(360, 0, true), Err(ProtocolError::InvalidMessageBytes(0))));
        assert!(matches!(ProtocolCodec::new(0, 2, true), Err(ProtocolError::ZeroPrecision)));
        assert!(ProtocolCodec::new(u64::MAX - 10, 8, true).is_ok());
    }

    proptest! {
        #[test]
        fn prop_angles_wrap_into_range(angle in -1.0e4f64..1.0e4, precision in 1u64..5000) {
            let codec = ProtocolCodec::new(precision, 2, true).unwrap();
            let encoded = codec.encode(angle).unwrap();
            prop_assert!(!encoded.is_error);
            prop_assert!(encoded.value < precision);
        }

        #[test]
        fn prop_reserved_range_disjoint(message_bytes in 1u8..=4, fraction in 0.0f64..=1.0) {
            let max = 1u64 << (8 * message_bytes as u32);
            let precision = 1 + ((max - RESERVED_CODES - 1) as f64 * fraction) as u64;
            let codec = ProtocolCodec::new(precision, message_bytes, true).unwrap();
            prop_assert!(precision <= codec.reserved_floor());
            for code in ReservedCode::ALL {
                prop_assert!(codec.is_reserved(codec.code(code)));
                prop_assert!(codec.code(code) >= precision);
            }
        }
    }
}
