//! Verification of the signed `initData` string the Telegram WebApp client
//! attaches to every request.
//!
//! The platform signs the sorted `key=value` lines of the launch parameters
//! with `HMAC-SHA256(HMAC-SHA256("WebAppData", bot_token), check_string)`.
//! A session is accepted only if that signature matches and `auth_date` is no
//! older than the configured window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

const SECRET_KEY_SEED: &[u8] = b"WebAppData";

#[derive(Clone)]
pub struct SessionVerifier {
    bot_token: String,
    ttl_ms: i64,
}

impl SessionVerifier {
    pub fn new(bot_token: String, ttl_ms: i64) -> Self {
        Self { bot_token, ttl_ms }
    }

    pub fn verify(&self, init_data: &str, now_ms: i64) -> bool {
        verify_init_data(init_data, &self.bot_token, now_ms, self.ttl_ms)
    }
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(message);
    Some(mac)
}

fn is_lower_hex(hash: &str) -> bool {
    hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Sorted `key=value` lines of every field except `hash`, joined by `\n`.
fn data_check_string(init_data: &str) -> (Option<String>, String) {
    let mut hash = None;
    let mut lines = Vec::new();

    for (key, value) in form_urlencoded::parse(init_data.as_bytes()) {
        if key == "hash" {
            if hash.is_none() {
                hash = Some(value.into_owned());
            }
            continue;
        }
        lines.push(format!("{}={}", key, value));
    }
    lines.sort();

    (hash, lines.join("\n"))
}

/// Never panics or errors; every failure is reported as `false`, with the
/// failing check logged server-side only.
pub fn verify_init_data(init_data: &str, bot_token: &str, now_ms: i64, ttl_ms: i64) -> bool {
    if init_data.is_empty() || bot_token.is_empty() {
        log::error!("Security check failed: missing initData or bot token.");
        return false;
    }

    let (hash, check_string) = data_check_string(init_data);
    let Some(hash) = hash else {
        log::warn!("Security check failed: hash is missing.");
        return false;
    };

    let Some(secret_key) = hmac_sha256(SECRET_KEY_SEED, bot_token.as_bytes()) else {
        return false;
    };
    let secret_key = secret_key.finalize().into_bytes();
    let Some(mac) = hmac_sha256(&secret_key, check_string.as_bytes()) else {
        return false;
    };

    let signature = match hex::decode(&hash) {
        Ok(bytes) if is_lower_hex(&hash) => bytes,
        _ => {
            log::warn!("Security check failed: hash mismatch.");
            return false;
        }
    };
    if mac.verify_slice(&signature).is_err() {
        log::warn!("Security check failed: hash mismatch.");
        return false;
    }

    let auth_date = form_urlencoded::parse(init_data.as_bytes())
        .find(|(key, _)| key == "auth_date")
        .map(|(_, value)| value.into_owned());
    let Some(auth_date) = auth_date else {
        log::warn!("Security check failed: auth_date is missing.");
        return false;
    };

    let Some(auth_ms) = auth_date
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|seconds| seconds.checked_mul(1000))
    else {
        log::warn!("Security check failed: auth_date is not a timestamp.");
        return false;
    };

    if now_ms.saturating_sub(auth_ms) > ttl_ms {
        log::warn!(
            "Security check failed: data expired ({}s limit exceeded).",
            ttl_ms / 1000
        );
        return false;
    }

    true
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const BOT_TOKEN: &str = "123456:TEST-bot-token";
    const TTL_MS: i64 = 1_300_000;
    const AUTH_DATE: i64 = 1_700_000_000;

    /// Builds a correctly signed initData string from the given fields.
    pub fn sign(fields: &[(&str, &str)], bot_token: &str) -> String {
        let mut lines: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        lines.sort();
        let check_string = lines.join("\n");

        let secret_key = hmac_sha256(SECRET_KEY_SEED, bot_token.as_bytes())
            .unwrap()
            .finalize()
            .into_bytes();
        let hash = hex::encode(
            hmac_sha256(&secret_key, check_string.as_bytes())
                .unwrap()
                .finalize()
                .into_bytes(),
        );

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }

    fn session(auth_date: i64) -> String {
        let auth_date = auth_date.to_string();
        sign(
            &[
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
                ("user", r#"{"id":279058397,"first_name":"Vlad","username":"vdkfrost"}"#),
                ("auth_date", auth_date.as_str()),
            ],
            BOT_TOKEN,
        )
    }

    #[test]
    fn accepts_a_fresh_signed_session() {
        let init_data = session(AUTH_DATE);

        assert!(verify_init_data(&init_data, BOT_TOKEN, AUTH_DATE * 1000, TTL_MS));
    }

    #[test]
    fn expiration_window_boundary() {
        let init_data = session(AUTH_DATE);
        let issued_ms = AUTH_DATE * 1000;

        assert!(verify_init_data(&init_data, BOT_TOKEN, issued_ms + TTL_MS - 1, TTL_MS));
        assert!(verify_init_data(&init_data, BOT_TOKEN, issued_ms + TTL_MS, TTL_MS));
        assert!(!verify_init_data(&init_data, BOT_TOKEN, issued_ms + TTL_MS + 1, TTL_MS));
    }

    #[test]
    fn rejects_a_different_bot_token() {
        let init_data = session(AUTH_DATE);

        assert!(!verify_init_data(&init_data, "654321:other", AUTH_DATE * 1000, TTL_MS));
    }

    #[test]
    fn any_single_character_mutation_fails() {
        let init_data = session(AUTH_DATE);
        let hash_start = init_data.find("&hash=").unwrap();

        for position in 0..hash_start {
            let original = init_data.as_bytes()[position];
            // Keep the structure parseable, only touch value/key characters.
            if matches!(original, b'&' | b'=' | b'%') {
                continue;
            }
            let replacement = if original == b'x' { 'y' } else { 'x' };
            let mut mutated = init_data.clone();
            mutated.replace_range(position..position + 1, &replacement.to_string());

            assert!(
                !verify_init_data(&mutated, BOT_TOKEN, AUTH_DATE * 1000, TTL_MS),
                "mutation at {} was accepted: {}",
                position,
                mutated
            );
        }
    }

    #[test]
    fn field_order_does_not_matter() {
        let init_data = session(AUTH_DATE);
        let mut pairs: Vec<&str> = init_data.split('&').collect();
        pairs.reverse();
        let reordered = pairs.join("&");

        assert!(verify_init_data(&reordered, BOT_TOKEN, AUTH_DATE * 1000, TTL_MS));
    }

    #[test]
    fn rejects_missing_pieces() {
        let now = AUTH_DATE * 1000;

        assert!(!verify_init_data("", BOT_TOKEN, now, TTL_MS));
        assert!(!verify_init_data(&session(AUTH_DATE), "", now, TTL_MS));

        let unsigned = "auth_date=1700000000&query_id=abc";
        assert!(!verify_init_data(unsigned, BOT_TOKEN, now, TTL_MS));

        let no_auth_date = sign(&[("query_id", "abc")], BOT_TOKEN);
        assert!(!verify_init_data(&no_auth_date, BOT_TOKEN, now, TTL_MS));

        let garbage_date = sign(&[("auth_date", "soon")], BOT_TOKEN);
        assert!(!verify_init_data(&garbage_date, BOT_TOKEN, now, TTL_MS));
    }

    #[test]
    fn rejects_uppercase_hash() {
        let init_data = session(AUTH_DATE);
        let (body, hash) = init_data.split_once("&hash=").unwrap();
        let shouted = format!("{}&hash={}", body, hash.to_uppercase());

        assert!(!verify_init_data(&shouted, BOT_TOKEN, AUTH_DATE * 1000, TTL_MS));
    }

    #[test]
    fn verifier_carries_its_window() {
        let verifier = SessionVerifier::new(BOT_TOKEN.to_string(), 10_000);
        let init_data = session(AUTH_DATE);

        assert!(verifier.verify(&init_data, AUTH_DATE * 1000 + 10_000));
        assert!(!verifier.verify(&init_data, AUTH_DATE * 1000 + 10_001));
    }
}
