use std::fmt;

macro_rules! status_codes {
    ($( $name:ident = $code:expr ),* $(,)?) => {
        /// A 32-bit status value. The top bit marks the code as an error, the
        /// next two bits as a warning or error severity class, and the low
        /// bits are not interpreted here (sub-codes are not modelled).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct StatusCode(u32);

        impl StatusCode {
            $( pub const $name: StatusCode = StatusCode($code); )*

            pub const fn from_bits(bits: u32) -> StatusCode {
                StatusCode(bits)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub fn name(self) -> &'static str {
                match self.0 {
                    $( $code => stringify!($name), )*
                    _ => "Unknown",
                }
            }
        }
    };
}

status_codes! {
    Good = 0x0000_0000,
    Uncertain = 0x4000_0000,

    BadUnexpectedError = 0x8000_0000,
    BadInternalError = 0x8000_1000,
    BadOutOfMemory = 0x8000_2000,
    BadTimeout = 0x800A_0000,
    BadNotConnected = 0x808C_0000,
    BadCommunicationError = 0x8008_3000,
    BadEncodingError = 0x8004_0000,
    BadDecodingError = 0x8004_1000,
    BadEncodingLimitsExceeded = 0x8004_2000,
    BadRequestTooLarge = 0x80B8_0000,
    BadResponseTooLarge = 0x80B9_0000,
    BadUnknownResponse = 0x8001_0000,
    BadInvalidArgument = 0x8008_0000,
    BadOutOfRange = 0x803D_0000,
    BadNotSupported = 0x803E_0000,
    BadNothingToDo = 0x800F_0000,
    BadTooManyOperations = 0x8010_0000,

    BadTcpServerTooBusy = 0x807E_0000,
    BadTcpMessageTypeInvalid = 0x807F_0000,
    BadTcpSecureChannelUnknown = 0x8080_0000,
    BadTcpMessageTooLarge = 0x8081_0000,
    BadTcpNotEnoughResources = 0x8082_0000,
    BadTcpInternalError = 0x8083_0000,
    BadTcpEndpointUrlInvalid = 0x8084_0000,
    BadRequestInterrupted = 0x8085_0000,
    BadRequestTimeout = 0x8086_0000,
    BadSecureChannelClosed = 0x8087_0000,
    BadSecureChannelTokenUnknown = 0x8088_0000,
    BadSequenceNumberInvalid = 0x8089_0000,
    BadProtocolVersionUnsupported = 0x80BE_0000,

    BadConnectionClosed = 0x80AE_0000,
    BadConnectionRejected = 0x80AF_0000,
    BadSecureChannelIdInvalid = 0x80B0_0000,
    BadInvalidTimestamp = 0x80B1_0000,
    BadNonceInvalid = 0x80B2_0000,
    BadSessionIdInvalid = 0x80B3_0000,
    BadSessionClosed = 0x80B4_0000,
    BadSessionNotActivated = 0x80B5_0000,
    BadSubscriptionIdInvalid = 0x80B6_0000,
    BadRequestHeaderInvalid = 0x80B7_0000,
    BadTimestampsToReturnInvalid = 0x80B8_1000,
    BadRequestCancelledByClient = 0x80BA_0000,

    BadIdentityTokenInvalid = 0x8045_0000,
    BadIdentityTokenRejected = 0x8046_0000,
    BadUserAccessDenied = 0x801F_0000,
    BadApplicationSignatureInvalid = 0x80F2_0000,
    BadUserSignatureInvalid = 0x80F3_0000,
    BadCertificateInvalid = 0x8010_1000,
    BadCertificateHostNameInvalid = 0x8015_1000,
    BadCertificateUriInvalid = 0x8015_2000,
    BadCertificateUseNotAllowed = 0x8015_3000,
    BadCertificateTimeInvalid = 0x8012_0000,
    BadSecurityChecksFailed = 0x8013_0000,
    BadSecurityPolicyRejected = 0x80E1_0000,
    BadSecurityModeInsufficient = 0x810D_0000,

    BadTooManySessions = 0x8101_0000,
    BadTooManySubscriptions = 0x8100_0000,
    BadMaxConnectionsReached = 0x80C1_0000,
    BadServerHalted = 0x800E_0000,
    BadShutdown = 0x800D_0000,
    BadNoCommunication = 0x8004_4000,
    BadResourceUnavailable = 0x8004_5000,
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

impl StatusCode {
    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    pub fn is_uncertain(self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl std::error::Error for StatusCode {}

impl crate::encoding::UaNullable for StatusCode {}

impl crate::encoding::SimpleBinaryEncodable for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: std::io::Write + ?Sized>(
        &self,
        stream: &mut S,
    ) -> crate::encoding::EncodingResult<usize> {
        crate::encoding::write_u32(stream, self.0)
    }
}

impl crate::encoding::SimpleBinaryDecodable for StatusCode {
    fn decode<S: std::io::Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &crate::encoding::DecodingOptions,
    ) -> crate::encoding::EncodingResult<Self> {
        Ok(StatusCode(crate::encoding::read_u32(stream)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert!(StatusCode::Good.is_good());
        assert!(StatusCode::BadDecodingError.is_bad());
        assert!(StatusCode::Uncertain.is_uncertain());
    }

    #[test]
    fn round_trips_through_bits() {
        let code = StatusCode::BadSecureChannelIdInvalid;
        assert_eq!(StatusCode::from_bits(code.bits()), code);
    }
}
