//! Human-readable catalogue of SMTP reply codes, used for the messages
//! surfaced to the client. Extended codes refine the generic wording.

/// Describes a reply code, preferring the extended status when it names a
/// more precise condition.
pub fn describe_reply(code: u16, extended: Option<&str>) -> &'static str {
    match (code, extended) {
        (550, Some("5.1.1")) => "Email address does not exist",
        (550, Some("5.2.1")) => "Mailbox is full",
        (550, Some("5.7.1")) => "Sender rejected",
        (554, Some("5.7.1")) => "Service refused, user blocked",

        (250, _) => "Address valid and accepted",
        (251, _) => "User not local, the message would be forwarded",

        (450, _) => "Action not taken: mailbox temporarily unavailable",
        (451, _) => "Action aborted: server processing error",
        (452, _) => "Action not taken: insufficient storage",

        (500, _) => "Syntax error in command",
        (501, _) => "Syntax error in parameters",
        (503, _) => "Bad sequence of commands",
        (550, _) => "Action not taken: mailbox unavailable or access denied",
        (551, _) => "User not local",
        (552, _) => "Action aborted: storage allocation exceeded",
        (553, _) => "Action not taken: invalid mailbox name",
        (554, _) => "Transaction failed",

        _ => "Unknown SMTP reply code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_code_refines_the_generic_wording() {
        assert_eq!(
            describe_reply(550, Some("5.1.1")),
            "Email address does not exist"
        );
        assert_eq!(
            describe_reply(550, None),
            "Action not taken: mailbox unavailable or access denied"
        );
        assert_eq!(describe_reply(550, Some("5.9.9")), describe_reply(550, None));
    }

    #[test]
    fn unknown_codes_have_a_fallback() {
        assert_eq!(describe_reply(299, None), "Unknown SMTP reply code");
    }
}
