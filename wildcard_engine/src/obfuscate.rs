// Card obfuscation and identity derivation.
//
// Hands travel inside every snapshot, so card fields are XOR-encrypted
// under the owning player's private id and hex-encoded. This is
// obfuscation against bored players opening devtools, not cryptography;
// what matters is that a key mismatch decodes to garbage rather than a
// crash, which every caller treats as "card not found".
//
// Identity chain: private id (uuid, known only to its owner and the host)
// → public player id (FNV-1a hash, base36) → secret id (public id
// encrypted under the private id). The secret id travels in snapshots so a
// migrated host, which never saw the original private ids, can still
// verify a rejoining player: decrypting the stored secret with the
// presented private id must yield the public id.

use wildcard_prng::GameRng;
use wildcard_protocol::types::{PlayerId, PrivateId, SecretId};

/// XOR the input with a repeating key and hex-encode the result.
pub fn xor_encrypt(plain: &str, key: &str) -> String {
    let key = key.as_bytes();
    let mut out = String::with_capacity(plain.len() * 2);
    for (i, byte) in plain.bytes().enumerate() {
        let k = key[i % key.len()];
        let x = byte ^ k;
        out.push(hex_digit(x >> 4));
        out.push(hex_digit(x & 0xf));
    }
    out
}

/// Reverse of `xor_encrypt`. Returns `None` if the input is not valid hex
/// or the decrypted bytes are not UTF-8, which is what a wrong key
/// produces in practice.
pub fn xor_decrypt(cipher: &str, key: &str) -> Option<String> {
    if cipher.len() % 2 != 0 || key.is_empty() {
        return None;
    }
    let key = key.as_bytes();
    let raw = cipher.as_bytes();
    let mut out = Vec::with_capacity(raw.len() / 2);
    for i in (0..raw.len()).step_by(2) {
        let hi = hex_value(raw[i])?;
        let lo = hex_value(raw[i + 1])?;
        out.push(((hi << 4) | lo) ^ key[(i / 2) % key.len()]);
    }
    String::from_utf8(out).ok()
}

fn hex_digit(v: u8) -> char {
    char::from(if v < 10 { b'0' + v } else { b'a' + v - 10 })
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// FNV-1a over the input, rendered in base36. Used to derive the public
/// player id from the private id.
pub fn identity_hash(input: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    to_base36(hash)
}

fn to_base36(mut v: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if v == 0 {
        return "0".into();
    }
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while v > 0 {
        i -= 1;
        buf[i] = DIGITS[(v % 36) as usize];
        v /= 36;
    }
    String::from_utf8_lossy(&buf[i..]).into_owned()
}

/// Version-4 uuid drawn from the engine's own PRNG, so card and placement
/// ids are reproducible from the seed.
pub fn uuid_v4(rng: &mut GameRng) -> String {
    let (mut hi, mut lo) = rng.next_128_bits();
    hi = (hi & 0xffff_ffff_ffff_0fff) | 0x0000_0000_0000_4000;
    lo = (lo & 0x3fff_ffff_ffff_ffff) | 0x8000_0000_0000_0000;
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        hi >> 32,
        (hi >> 16) & 0xffff,
        hi & 0xffff,
        lo >> 48,
        lo & 0xffff_ffff_ffff
    )
}

/// Public player id derived from a private id.
pub fn derive_player_id(private: &PrivateId) -> PlayerId {
    PlayerId(identity_hash(&private.0))
}

/// Secret id stored in the seat: the public id encrypted under the
/// private id.
pub fn derive_secret_id(public: &PlayerId, private: &PrivateId) -> SecretId {
    SecretId(xor_encrypt(&public.0, &private.0))
}

/// Migration-time identity check: the presented private id must decrypt
/// the stored secret back to the public id.
pub fn verify_secret(secret: &SecretId, public: &PlayerId, presented: &PrivateId) -> bool {
    xor_decrypt(&secret.0, &presented.0).as_deref() == Some(public.0.as_str())
}
