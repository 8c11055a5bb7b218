//! ICE-lite responder: answers STUN binding requests from the one remote
//! endpoint named at signaling time, never originates connectivity checks
//! of its own (RFC 8445 §2.2's "ice-lite").

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::Bytes;
use rand::Rng;
use sfu_shared::error::Result;

use crate::stun::attributes::{
    append_fingerprint, append_message_integrity, encode_xor_mapped_address, verify_fingerprint,
    verify_message_integrity, verify_username, ATTR_FINGERPRINT, ATTR_USE_CANDIDATE,
    ATTR_XOR_MAPPED_ADDRESS,
};
use crate::stun::message::{Class, Message, MessageType, METHOD_BINDING};

/// Default length of a locally generated short-term-credential password,
/// matching the conventional ICE password length (RFC 8445 §5.3 requires
/// at least 128 bits of randomness; 22 base64-alphabet characters clears
/// that).
pub const DEFAULT_PASSWORD_LENGTH: usize = 22;

const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Generates a random printable password of [`DEFAULT_PASSWORD_LENGTH`]
/// characters, suitable as an ICE short-term credential.
pub fn generate_local_password() -> String {
    let mut rng = rand::rng();
    (0..DEFAULT_PASSWORD_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..PASSWORD_ALPHABET.len());
            PASSWORD_ALPHABET[idx] as char
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IceEvent {
    /// The selected remote endpoint changed: a USE-CANDIDATE binding
    /// request nominated an endpoint other than the one currently
    /// selected (or none was selected yet).
    ConnectionCompleted { remote: SocketAddr },
    /// A binding request failed to parse or authenticate. Never applied
    /// partially — the responder's selection state is unchanged.
    ConnectionError,
}

/// Sans-IO driver: feed inbound datagrams via [`Self::handle_read`], drain
/// outbound responses via [`Self::poll_transmit`] and state-change
/// notifications via [`Self::poll_event`].
#[derive(Debug)]
pub struct IceLiteResponder {
    local_ufrag: String,
    local_pwd: String,
    remote_ufrag: String,
    selected: Option<SocketAddr>,
    transmits: VecDeque<(Bytes, SocketAddr)>,
    events: VecDeque<IceEvent>,
}

impl IceLiteResponder {
    pub fn new(local_ufrag: String, local_pwd: String, remote_ufrag: String) -> Self {
        Self {
            local_ufrag,
            local_pwd,
            remote_ufrag,
            selected: None,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn local_ufrag(&self) -> &str {
        &self.local_ufrag
    }

    pub fn local_pwd(&self) -> &str {
        &self.local_pwd
    }

    pub fn selected_remote(&self) -> Option<SocketAddr> {
        self.selected
    }

    /// Processes one inbound datagram already identified (by
    /// [`crate::stun::message::Message::looks_like_stun`]) as a STUN
    /// message. Parse or authentication failures never mutate `selected`;
    /// they only ever push a [`IceEvent::ConnectionError`].
    pub fn handle_read(&mut self, buf: &[u8], source: SocketAddr) {
        match self.process(buf, source) {
            Ok(()) => {}
            Err(_) => self.events.push_back(IceEvent::ConnectionError),
        }
    }

    fn process(&mut self, buf: &[u8], source: SocketAddr) -> Result<()> {
        let msg = Message::decode(buf)?;
        if msg.typ.method != METHOD_BINDING || msg.typ.class != Class::Request {
            // Not a request this ICE-lite responder answers; neither a
            // protocol violation nor worth surfacing.
            return Ok(());
        }

        verify_username(&msg, &self.local_ufrag, &self.remote_ufrag)?;
        verify_message_integrity(&msg, self.local_pwd.as_bytes())?;
        if msg.contains(ATTR_FINGERPRINT) {
            verify_fingerprint(&msg)?;
        }

        let mut response = Message::new(
            MessageType::new(METHOD_BINDING, Class::SuccessResponse),
            msg.transaction_id,
        );
        response.add(
            ATTR_XOR_MAPPED_ADDRESS,
            encode_xor_mapped_address(source.ip(), source.port(), &msg.transaction_id.0),
        );
        append_message_integrity(&mut response, self.local_pwd.as_bytes());
        append_fingerprint(&mut response);
        self.transmits.push_back((response.encode(), source));

        if msg.contains(ATTR_USE_CANDIDATE) && self.selected != Some(source) {
            self.selected = Some(source);
            self.events
                .push_back(IceEvent::ConnectionCompleted { remote: source });
        }

        Ok(())
    }

    pub fn poll_transmit(&mut self) -> Option<(Bytes, SocketAddr)> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<IceEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::attributes::{encode_username, ATTR_USERNAME};
    use crate::stun::message::TransactionId;

    fn binding_request(
        local_ufrag: &str,
        remote_ufrag: &str,
        remote_pwd: &str,
        use_candidate: bool,
        tid: [u8; 12],
    ) -> Message {
        let mut m = Message::new(
            MessageType::new(METHOD_BINDING, Class::Request),
            TransactionId(tid),
        );
        m.add(ATTR_USERNAME, encode_username(local_ufrag, remote_ufrag));
        if use_candidate {
            m.add(ATTR_USE_CANDIDATE, Bytes::new());
        }
        append_message_integrity(&mut m, remote_pwd.as_bytes());
        append_fingerprint(&mut m);
        m
    }

    #[test]
    fn valid_use_candidate_request_selects_and_signals_once() {
        let mut r = IceLiteResponder::new("lfrag".into(), "lpwd".into(), "rfrag".into());
        let source: SocketAddr = "203.0.113.9:5000".parse().unwrap();
        let req = binding_request("lfrag", "rfrag", "lpwd", true, [1u8; 12]);

        r.handle_read(&req.encode(), source);
        assert_eq!(r.selected_remote(), Some(source));
        assert_eq!(
            r.poll_event(),
            Some(IceEvent::ConnectionCompleted { remote: source })
        );
        assert!(r.poll_event().is_none());
        let (resp_bytes, dest) = r.poll_transmit().unwrap();
        assert_eq!(dest, source);
        let resp = Message::decode(&resp_bytes).unwrap();
        assert_eq!(resp.typ.class, Class::SuccessResponse);

        // A second binding request from the same selected source does not
        // re-signal.
        let req2 = binding_request("lfrag", "rfrag", "lpwd", true, [2u8; 12]);
        r.handle_read(&req2.encode(), source);
        assert!(r.poll_event().is_none());
    }

    #[test]
    fn wrong_password_surfaces_connection_error_without_changing_selection() {
        let mut r = IceLiteResponder::new("lfrag".into(), "lpwd".into(), "rfrag".into());
        let source: SocketAddr = "203.0.113.9:5000".parse().unwrap();
        let req = binding_request("lfrag", "rfrag", "wrongpwd", true, [3u8; 12]);

        r.handle_read(&req.encode(), source);
        assert_eq!(r.selected_remote(), None);
        assert_eq!(r.poll_event(), Some(IceEvent::ConnectionError));
        assert!(r.poll_transmit().is_none());
    }

    #[test]
    fn selection_changes_on_renomination_to_a_new_endpoint() {
        let mut r = IceLiteResponder::new("lfrag".into(), "lpwd".into(), "rfrag".into());
        let first: SocketAddr = "203.0.113.9:5000".parse().unwrap();
        let second: SocketAddr = "203.0.113.9:5001".parse().unwrap();

        r.handle_read(
            &binding_request("lfrag", "rfrag", "lpwd", true, [4u8; 12]).encode(),
            first,
        );
        assert_eq!(r.poll_event(), Some(IceEvent::ConnectionCompleted { remote: first }));
        r.poll_transmit();

        r.handle_read(
            &binding_request("lfrag", "rfrag", "lpwd", true, [5u8; 12]).encode(),
            second,
        );
        assert_eq!(
            r.poll_event(),
            Some(IceEvent::ConnectionCompleted { remote: second })
        );
        assert_eq!(r.selected_remote(), Some(second));
    }

    #[test]
    fn generated_password_has_expected_length() {
        let pwd = generate_local_password();
        assert_eq!(pwd.len(), DEFAULT_PASSWORD_LENGTH);
        assert!(pwd.chars().all(|c| PASSWORD_ALPHABET.contains(&(c as u8))));
    }
}
