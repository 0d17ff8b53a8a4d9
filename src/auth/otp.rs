use rand::Rng;
use time::{Duration, OffsetDateTime};

use crate::auth::repo_types::PendingOtp;

pub const OTP_TTL: Duration = Duration::minutes(10);

/// Six-digit numeric code, never starting with zero.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

pub fn issue_at(now: OffsetDateTime) -> PendingOtp {
    PendingOtp {
        code: generate_code(),
        expires_at: now + OTP_TTL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_ascii_digits() {
        for _ in 0..500 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn expiry_is_ten_minutes_after_issuance() {
        let now = OffsetDateTime::now_utc();
        let otp = issue_at(now);
        assert_eq!(otp.expires_at - now, Duration::minutes(10));
        assert!(otp.is_live_at(otp.expires_at - Duration::seconds(1)));
        assert!(!otp.is_live_at(otp.expires_at));
        assert!(!otp.is_live_at(otp.expires_at + Duration::seconds(1)));
    }
}
