//! The handful of STUN attributes an ICE-lite responder needs to read or
//! write, RFC 5389 §15.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sfu_shared::error::{Error, Result};
use sfu_shared::ByteWriter;
use sha1::Sha1;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use subtle::ConstantTimeEq;

use super::message::{Message, MAGIC_COOKIE};

pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_PRIORITY: u16 = 0x0024;
pub const ATTR_USE_CANDIDATE: u16 = 0x0025;
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_ICE_CONTROLLED: u16 = 0x8029;
pub const ATTR_ICE_CONTROLLING: u16 = 0x802A;

const FINGERPRINT_XOR: u32 = 0x5354_554E;
const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

type HmacSha1 = Hmac<Sha1>;

pub fn encode_username(local_ufrag: &str, remote_ufrag: &str) -> Bytes {
    Bytes::from(format!("{local_ufrag}:{remote_ufrag}"))
}

/// `true` if `msg`'s USERNAME attribute equals `"{local_ufrag}:{remote_ufrag}"`.
pub fn verify_username(msg: &Message, local_ufrag: &str, remote_ufrag: &str) -> Result<()> {
    let attr = msg
        .get(ATTR_USERNAME)
        .ok_or(Error::ErrStunUsernameMismatch)?;
    let expected = encode_username(local_ufrag, remote_ufrag);
    if attr.value.as_ref() == expected.as_ref() {
        Ok(())
    } else {
        Err(Error::ErrStunUsernameMismatch)
    }
}

/// Appends a MESSAGE-INTEGRITY attribute computed with `key` (the relevant
/// short-term credential's password, UTF-8 bytes) over every byte of `msg`
/// preceding it.
pub fn append_message_integrity(msg: &mut Message, key: &[u8]) {
    let signed = msg.encode_for_trailer(ATTR_MESSAGE_INTEGRITY, 24);
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&signed);
    let digest = mac.finalize().into_bytes();
    msg.add(ATTR_MESSAGE_INTEGRITY, Bytes::copy_from_slice(&digest));
}

pub fn verify_message_integrity(msg: &Message, key: &[u8]) -> Result<()> {
    let attr = msg
        .get(ATTR_MESSAGE_INTEGRITY)
        .ok_or(Error::ErrStunIntegrityMismatch)?;
    let signed = msg.encode_for_trailer(ATTR_MESSAGE_INTEGRITY, 24);
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&signed);
    let expected = mac.finalize().into_bytes();
    if bool::from(expected.as_slice().ct_eq(attr.value.as_ref())) {
        Ok(())
    } else {
        Err(Error::ErrStunIntegrityMismatch)
    }
}

/// Appends a FINGERPRINT attribute: CRC-32 (ISO-HDLC) of the message so
/// far, XORed with the magic constant from RFC 5389 §15.5. Must be the
/// last attribute added.
pub fn append_fingerprint(msg: &mut Message) {
    let signed = msg.encode_for_trailer(ATTR_FINGERPRINT, 8);
    let crc = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(&signed);
    let value = crc ^ FINGERPRINT_XOR;
    msg.add(ATTR_FINGERPRINT, Bytes::copy_from_slice(&value.to_be_bytes()));
}

pub fn verify_fingerprint(msg: &Message) -> Result<()> {
    let attr = msg.get(ATTR_FINGERPRINT).ok_or(Error::ErrStunFingerprintMismatch)?;
    if attr.value.len() != 4 {
        return Err(Error::ErrStunFingerprintMismatch);
    }
    let signed = msg.encode_for_trailer(ATTR_FINGERPRINT, 8);
    let crc = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(&signed);
    let expected = crc ^ FINGERPRINT_XOR;
    let got = u32::from_be_bytes(attr.value.as_ref().try_into().unwrap());
    if expected == got {
        Ok(())
    } else {
        Err(Error::ErrStunFingerprintMismatch)
    }
}

/// Builds an XOR-MAPPED-ADDRESS attribute value for `addr`, XORing the port
/// against the top 16 bits of the magic cookie and the address against the
/// cookie (plus the transaction id, for IPv6).
pub fn encode_xor_mapped_address(ip: IpAddr, port: u16, transaction_id: &[u8; 12]) -> Bytes {
    let mut w = ByteWriter::new();
    w.write_u8(0);
    let xor_port = port ^ ((MAGIC_COOKIE >> 16) as u16);
    match ip {
        IpAddr::V4(v4) => {
            w.write_u8(FAMILY_IPV4);
            w.write_u16(xor_port);
            let xor_ip = u32::from(v4) ^ MAGIC_COOKIE;
            w.write_u32(xor_ip);
        }
        IpAddr::V6(v6) => {
            w.write_u8(FAMILY_IPV6);
            w.write_u16(xor_port);
            let mut cookie_and_tid = [0u8; 16];
            cookie_and_tid[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            cookie_and_tid[4..16].copy_from_slice(transaction_id);
            let octets = v6.octets();
            let mut xored = [0u8; 16];
            for i in 0..16 {
                xored[i] = octets[i] ^ cookie_and_tid[i];
            }
            w.write_bytes(&xored);
        }
    }
    Bytes::from(w.into_vec())
}

pub fn decode_xor_mapped_address(value: &[u8], transaction_id: &[u8; 12]) -> Result<(IpAddr, u16)> {
    if value.len() < 4 {
        return Err(Error::ErrMalformedStunMessage);
    }
    let family = value[1];
    let xor_port = u16::from_be_bytes([value[2], value[3]]);
    let port = xor_port ^ ((MAGIC_COOKIE >> 16) as u16);
    match family {
        FAMILY_IPV4 => {
            if value.len() < 8 {
                return Err(Error::ErrMalformedStunMessage);
            }
            let xor_ip = u32::from_be_bytes(value[4..8].try_into().unwrap());
            let ip = Ipv4Addr::from(xor_ip ^ MAGIC_COOKIE);
            Ok((IpAddr::V4(ip), port))
        }
        FAMILY_IPV6 => {
            if value.len() < 20 {
                return Err(Error::ErrMalformedStunMessage);
            }
            let mut cookie_and_tid = [0u8; 16];
            cookie_and_tid[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            cookie_and_tid[4..16].copy_from_slice(transaction_id);
            let mut octets = [0u8; 16];
            for i in 0..16 {
                octets[i] = value[4 + i] ^ cookie_and_tid[i];
            }
            Ok((IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(Error::ErrMalformedStunMessage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::message::{Class, MessageType, TransactionId, METHOD_BINDING};

    #[test]
    fn xor_mapped_address_round_trips_v4() {
        let tid = [9u8; 12];
        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        let encoded = encode_xor_mapped_address(ip, 54321, &tid);
        let (decoded_ip, decoded_port) = decode_xor_mapped_address(&encoded, &tid).unwrap();
        assert_eq!(decoded_ip, ip);
        assert_eq!(decoded_port, 54321);
    }

    #[test]
    fn xor_mapped_address_round_trips_v6() {
        let tid = [3u8; 12];
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        let encoded = encode_xor_mapped_address(ip, 443, &tid);
        let (decoded_ip, decoded_port) = decode_xor_mapped_address(&encoded, &tid).unwrap();
        assert_eq!(decoded_ip, ip);
        assert_eq!(decoded_port, 443);
    }

    #[test]
    fn message_integrity_round_trips_and_detects_tamper() {
        let mut m = Message::new(
            MessageType::new(METHOD_BINDING, Class::Request),
            TransactionId([1u8; 12]),
        );
        m.add(ATTR_USERNAME, encode_username("lfrag", "rfrag"));
        append_message_integrity(&mut m, b"secretpwd");
        assert!(verify_message_integrity(&m, b"secretpwd").is_ok());
        assert!(verify_message_integrity(&m, b"wrongpwd").is_err());

        let mut decoded = Message::decode(&m.encode()).unwrap();
        decoded.attributes[0].value = Bytes::from_static(b"tampered:rfrag");
        assert!(verify_message_integrity(&decoded, b"secretpwd").is_err());
    }

    #[test]
    fn fingerprint_round_trips_and_detects_tamper() {
        let mut m = Message::new(
            MessageType::new(METHOD_BINDING, Class::SuccessResponse),
            TransactionId([2u8; 12]),
        );
        append_fingerprint(&mut m);
        assert!(verify_fingerprint(&m).is_ok());

        let mut decoded = Message::decode(&m.encode()).unwrap();
        decoded.transaction_id = TransactionId([9u8; 12]);
        assert!(verify_fingerprint(&decoded).is_err());
    }
}
