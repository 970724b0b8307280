//! Message envelope types shared by the mailbox and the rule engine.

use std::fmt;

/// Server-assigned unique identifier of a message in the selected folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a message's `From` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Local part (before the `@`).
    pub mailbox: String,
    /// Host part (after the `@`).
    pub host: String,
}

impl Sender {
    pub fn new(mailbox: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            host: host.into(),
        }
    }

    /// Parse `local@host`. The split happens at the last `@`; an address
    /// without one is kept entirely as the local part.
    pub fn parse(address: &str) -> Self {
        match address.rsplit_once('@') {
            Some((mailbox, host)) => Self::new(mailbox, host),
            None => Self::new(address, ""),
        }
    }

    /// Reconstructed `local@host` address.
    pub fn address(&self) -> String {
        format!("{}@{}", self.mailbox, self.host)
    }
}

/// Envelope of a fetched message. Bodies are never fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uid: Uid,
    pub from: Vec<Sender>,
    pub subject: String,
}

impl Message {
    pub fn new(uid: u32, from: Vec<Sender>, subject: impl Into<String>) -> Self {
        Self {
            uid: Uid(uid),
            from,
            subject: subject.into(),
        }
    }

    /// Address of the first sender, if any.
    pub fn first_sender_address(&self) -> Option<String> {
        self.from.first().map(Sender::address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_address_roundtrips_parts() {
        let sender = Sender::new("offer", "mail.spam.example");
        assert_eq!(sender.address(), "offer@mail.spam.example");
    }

    #[test]
    fn parse_splits_at_last_at_sign() {
        let sender = Sender::parse("\"odd@name\"@example.com");
        assert_eq!(sender.mailbox, "\"odd@name\"");
        assert_eq!(sender.host, "example.com");
    }

    #[test]
    fn parse_without_at_sign_has_empty_host() {
        let sender = Sender::parse("undisclosed-recipients");
        assert_eq!(sender.mailbox, "undisclosed-recipients");
        assert!(sender.host.is_empty());
    }

    #[test]
    fn first_sender_address_empty_list() {
        let msg = Message::new(1, vec![], "Hello");
        assert_eq!(msg.first_sender_address(), None);
    }
}
