//! Reserved call names.
//!
//! Names starting with a double underscore belong to the protocol.
//! Applications should keep their own call names outside that space.

/// Host-bound structured log record. One-way: never replied to.
pub const LOG_CALL: &str = "__log";

/// Suffix appended to the originating call name on a reply frame.
pub const REPLY_SUFFIX: &str = "__reply";

/// The call name a reply to `call` travels under.
pub fn reply_name(call: &str) -> String {
    let mut name = String::with_capacity(call.len() + REPLY_SUFFIX.len());
    name.push_str(call);
    name.push_str(REPLY_SUFFIX);
    name
}

/// Returns true if `call` carries the reply marker.
pub fn is_reply(call: &str) -> bool {
    call.ends_with(REPLY_SUFFIX)
}

/// The originating call name of a reply, or `None` if `reply` is not one.
pub fn origin_call(reply: &str) -> Option<&str> {
    reply.strip_suffix(REPLY_SUFFIX)
}

/// Returns true if `call` is handled by the protocol itself.
pub fn is_reserved(call: &str) -> bool {
    call == LOG_CALL || is_reply(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_marker_roundtrip() {
        let reply = reply_name("echo");
        assert_eq!(reply, "echo__reply");
        assert!(is_reply(&reply));
        assert_eq!(origin_call(&reply), Some("echo"));
        assert_eq!(origin_call("echo"), None);
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved(LOG_CALL));
        assert!(is_reserved("echo__reply"));
        assert!(!is_reserved("echo"));
        assert!(!is_reserved("log"));
    }
}
