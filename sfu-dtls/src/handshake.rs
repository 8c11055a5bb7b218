//! DTLS handshake message framing (RFC 6347 §4.2, RFC 5246 §7.4) — the
//! subset of message types a passive-mode (server-role) responder needs:
//! `ClientHello`, `HelloVerifyRequest`, `ServerHello`, `Certificate`,
//! `ServerKeyExchange`, `ServerHelloDone`, `ClientKeyExchange`, `Finished`.

use sfu_shared::cursor::{ByteReader, ByteWriter};
use sfu_shared::error::{Error, Result};

use crate::state::SrtpProtectionProfile;

pub const MSG_TYPE_CLIENT_HELLO: u8 = 1;
pub const MSG_TYPE_SERVER_HELLO: u8 = 2;
pub const MSG_TYPE_HELLO_VERIFY_REQUEST: u8 = 3;
pub const MSG_TYPE_CERTIFICATE: u8 = 11;
pub const MSG_TYPE_SERVER_KEY_EXCHANGE: u8 = 12;
pub const MSG_TYPE_SERVER_HELLO_DONE: u8 = 14;
pub const MSG_TYPE_CLIENT_KEY_EXCHANGE: u8 = 16;
pub const MSG_TYPE_FINISHED: u8 = 20;

/// Extension type for `use_srtp` (RFC 5764 §4.1.1).
const EXT_USE_SRTP: u16 = 14;

pub const HANDSHAKE_HEADER_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct HandshakeHeader {
    pub msg_type: u8,
    pub length: u32, // 24-bit
    pub message_seq: u16,
    pub fragment_offset: u32, // 24-bit
    pub fragment_length: u32, // 24-bit
}

impl HandshakeHeader {
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            msg_type: r.read_u8()?,
            length: r.read_u24()?,
            message_seq: r.read_u16()?,
            fragment_offset: r.read_u24()?,
            fragment_length: r.read_u24()?,
        })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.write_u8(self.msg_type);
        w.write_u24(self.length);
        w.write_u16(self.message_seq);
        w.write_u24(self.fragment_offset);
        w.write_u24(self.fragment_length);
    }
}

/// Wraps `body` in a (non-fragmented) handshake header and returns the
/// whole message, so it can both be sent and fed into the running
/// handshake transcript hash.
pub fn frame_handshake_message(msg_type: u8, message_seq: u16, body: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
    HandshakeHeader {
        msg_type,
        length: body.len() as u32,
        message_seq,
        fragment_offset: 0,
        fragment_length: body.len() as u32,
    }
    .write(&mut w);
    w.write_bytes(body);
    w.into_vec()
}

#[derive(Debug, Clone)]
pub struct ClientHello {
    pub client_random: [u8; 32],
    pub cookie: Vec<u8>,
    pub offered_srtp_profiles: Vec<u16>,
}

/// Parses a `ClientHello` body (the part after the handshake header).
/// We only need the random, the cookie and the offered `use_srtp`
/// profiles — cipher suites and compression methods are read past but
/// not inspected, since the only suite this responder ever selects is
/// the ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 baseline.
pub fn parse_client_hello(body: &[u8]) -> Result<ClientHello> {
    let mut r = ByteReader::new(body);
    let _client_version = r.read_u16()?;
    let random_bytes = r.read_bytes(32)?;
    let mut client_random = [0u8; 32];
    client_random.copy_from_slice(random_bytes);

    let session_id_len = r.read_u8()? as usize;
    r.skip(session_id_len)?;

    let cookie_len = r.read_u8()? as usize;
    let cookie = r.read_bytes(cookie_len)?.to_vec();

    let cipher_suites_len = r.read_u16()? as usize;
    r.skip(cipher_suites_len)?;

    let compression_methods_len = r.read_u8()? as usize;
    r.skip(compression_methods_len)?;

    let mut offered_srtp_profiles = Vec::new();
    if !r.is_empty() {
        let extensions_len = r.read_u16()? as usize;
        let ext_bytes = r.read_bytes(extensions_len)?;
        let mut er = ByteReader::new(ext_bytes);
        while !er.is_empty() {
            let ext_type = er.read_u16()?;
            let ext_len = er.read_u16()? as usize;
            let ext_body = er.read_bytes(ext_len)?;
            if ext_type == EXT_USE_SRTP {
                let mut pr = ByteReader::new(ext_body);
                let list_len = pr.read_u16()? as usize / 2;
                for _ in 0..list_len {
                    offered_srtp_profiles.push(pr.read_u16()?);
                }
            }
        }
    }

    Ok(ClientHello {
        client_random,
        cookie,
        offered_srtp_profiles,
    })
}

pub fn build_hello_verify_request(cookie: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(3 + cookie.len());
    w.write_u16(crate::record::DTLS_1_2_VERSION);
    w.write_u8(cookie.len() as u8);
    w.write_bytes(cookie);
    w.into_vec()
}

/// Cipher suite id for `TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256`
/// (RFC 5289), the baseline this responder always selects.
const CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256: u16 = 0xC02B;

pub fn build_server_hello(server_random: &[u8; 32], selected_profile: SrtpProtectionProfile) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(64);
    w.write_u16(crate::record::DTLS_1_2_VERSION);
    w.write_bytes(server_random);
    w.write_u8(0); // session_id length
    w.write_u16(CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256);
    w.write_u8(0); // compression method: null

    let mut ext = ByteWriter::new();
    ext.write_u16(EXT_USE_SRTP);
    ext.write_u16(3); // extension body length
    ext.write_u16(selected_profile.to_u16());
    ext.write_u8(0); // MKI length

    w.write_u16(ext.len() as u16);
    w.write_bytes(ext.as_slice());
    w.into_vec()
}

pub fn build_certificate(der: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(der.len() + 6);
    w.write_u24((der.len() + 3) as u32);
    w.write_u24(der.len() as u32);
    w.write_bytes(der);
    w.into_vec()
}

/// Named curve `x25519` (RFC 8422 §5.1.1, value 29).
const NAMED_CURVE_X25519: u16 = 29;

/// Builds a `ServerKeyExchange` for an explicit ECDHE curve. The
/// signature field is left as a structural placeholder: signing the
/// ephemeral key with the certificate's private key is delegated to the
/// DTLS cryptographic library per this core's scope (spec.md §1), so this
/// driver only shapes the message, it does not produce a signature a real
/// client would accept.
pub fn build_server_key_exchange(ephemeral_public: &[u8; 32]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(64);
    w.write_u8(3); // curve_type: named_curve
    w.write_u16(NAMED_CURVE_X25519);
    w.write_u8(ephemeral_public.len() as u8);
    w.write_bytes(ephemeral_public);
    // signature_algorithm (hash, signature) + signature, structural only.
    w.write_u8(4); // hash: sha256
    w.write_u8(3); // signature: ecdsa
    w.write_u16(0); // signature length: none computed
    w.into_vec()
}

pub fn build_server_hello_done() -> Vec<u8> {
    Vec::new()
}

pub fn parse_client_key_exchange(body: &[u8]) -> Result<[u8; 32]> {
    let mut r = ByteReader::new(body);
    let len = r.read_u8()? as usize;
    if len != 32 {
        return Err(Error::ErrOther(
            "only x25519 ECDHE client key exchange is supported".into(),
        ));
    }
    let bytes = r.read_bytes(32)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(out)
}

pub fn build_finished(verify_data: &[u8; 12]) -> Vec<u8> {
    verify_data.to_vec()
}

pub fn parse_finished(body: &[u8]) -> Result<[u8; 12]> {
    if body.len() != 12 {
        return Err(Error::ErrOther("Finished verify_data must be 12 bytes".into()));
    }
    let mut out = [0u8; 12];
    out.copy_from_slice(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_round_trips_random_and_cookie() {
        let mut body = ByteWriter::new();
        body.write_u16(crate::record::DTLS_1_2_VERSION);
        body.write_bytes(&[9u8; 32]);
        body.write_u8(0); // session id
        body.write_u8(4); // cookie len
        body.write_bytes(&[1, 2, 3, 4]);
        body.write_u16(2); // cipher suites len
        body.write_bytes(&[0xC0, 0x2B]);
        body.write_u8(1); // compression methods len
        body.write_u8(0);

        let mut ext = ByteWriter::new();
        ext.write_u16(EXT_USE_SRTP);
        ext.write_u16(5);
        ext.write_u16(2); // profile list length in bytes
        ext.write_u16(0x0001);
        ext.write_u8(0);
        body.write_u16(ext.len() as u16);
        body.write_bytes(ext.as_slice());

        let hello = parse_client_hello(&body.into_vec()).unwrap();
        assert_eq!(hello.client_random, [9u8; 32]);
        assert_eq!(hello.cookie, vec![1, 2, 3, 4]);
        assert_eq!(hello.offered_srtp_profiles, vec![0x0001]);
    }

    #[test]
    fn handshake_message_framing_round_trips_header() {
        let framed = frame_handshake_message(MSG_TYPE_CLIENT_HELLO, 0, b"body");
        let mut r = ByteReader::new(&framed);
        let header = HandshakeHeader::parse(&mut r).unwrap();
        assert_eq!(header.msg_type, MSG_TYPE_CLIENT_HELLO);
        assert_eq!(header.length, 4);
        assert_eq!(r.rest(), b"body");
    }
}
