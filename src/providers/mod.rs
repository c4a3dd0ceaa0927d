use hmac::{Hmac, Mac};
use sha2::Sha256;

pub mod accounting;
pub mod booking;
pub mod email;
pub mod payments;

type HmacSha256 = Hmac<Sha256>;

/// Verify an inbound webhook signature header of the form
/// `t=<unix-ts>,v1=<hex hmac-sha256>`, where the signed payload is
/// `<timestamp>.<body>`. Stale timestamps are rejected to stop replays.
pub fn verify_webhook_signature(payload: &str, signature_header: &str, secret: &str) -> bool {
    const TOLERANCE_SECS: i64 = 300;

    let mut timestamp: Option<&str> = None;
    let mut signature: Option<&str> = None;
    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v1) = part.strip_prefix("v1=") {
            signature = Some(v1);
        }
    }

    let (Some(ts_str), Some(expected_hex)) = (timestamp, signature) else {
        return false;
    };
    let Ok(ts) = ts_str.parse::<i64>() else {
        return false;
    };

    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > TOLERANCE_SECS {
        tracing::warn!(delta = (now - ts).abs(), "webhook signature too old");
        return false;
    }

    let signed_payload = format!("{ts_str}.{payload}");
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload.as_bytes());

    let Ok(expected_bytes) = hex_decode(expected_hex) else {
        return false;
    };
    mac.verify_slice(&expected_bytes).is_ok()
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::verify_webhook_signature;

    fn sign(payload: &str, ts: i64, secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{ts}.{payload}").as_bytes());
        let hex: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("t={ts},v1={hex}")
    }

    #[test]
    fn accepts_a_fresh_valid_signature() {
        let ts = chrono::Utc::now().timestamp();
        let header = sign("{\"ok\":true}", ts, "whsec_test");
        assert!(verify_webhook_signature("{\"ok\":true}", &header, "whsec_test"));
    }

    #[test]
    fn rejects_wrong_secret_and_stale_timestamps() {
        let ts = chrono::Utc::now().timestamp();
        let header = sign("body", ts, "whsec_test");
        assert!(!verify_webhook_signature("body", &header, "other_secret"));

        let stale = sign("body", ts - 3600, "whsec_test");
        assert!(!verify_webhook_signature("body", &stale, "whsec_test"));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(!verify_webhook_signature("body", "v1=zz", "s"));
        assert!(!verify_webhook_signature("body", "", "s"));
    }
}
