//! Minimal DNS question parsing for the trust-signal side channel.
//!
//! Only the pieces the admission policy needs: recognize a query and pull
//! out the first question's name. Responses, answer records, and EDNS are
//! intentionally ignored.

const HEADER_LEN: usize = 12;

/// RFC 1035 caps a full name at 255 octets.
const MAX_NAME_LEN: usize = 255;

/// Compression-pointer hop limit; anything deeper is treated as malformed.
const MAX_POINTER_HOPS: usize = 10;

/// Extract the first question name from a DNS query payload.
///
/// Returns `None` for responses (QR=1), payloads without questions, or
/// anything that does not parse as DNS. Names come back lower-cased and
/// dot-separated with no trailing dot, ready for comparison against a
/// configured secret.
pub fn first_query_name(payload: &[u8]) -> Option<String> {
    if payload.len() < HEADER_LEN {
        return None;
    }

    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    if flags & 0x8000 != 0 {
        return None; // response, not a query
    }

    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    if qdcount == 0 {
        return None;
    }

    let (name, _) = parse_name(payload, HEADER_LEN)?;
    if name.is_empty() {
        return None; // root query carries no trust signal
    }
    Some(name)
}

/// Parse a DNS name (handles compression pointers).
///
/// Returns the assembled name and the offset just past it in the original
/// (non-pointer) byte stream.
fn parse_name(payload: &[u8], mut offset: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut jumped = false;
    let mut return_offset = offset;
    let mut hops = 0;

    loop {
        let len = *payload.get(offset)? as usize;

        if len == 0 {
            if !jumped {
                return_offset = offset + 1;
            }
            break;
        }

        if len & 0xC0 == 0xC0 {
            let low = *payload.get(offset + 1)? as usize;
            if !jumped {
                return_offset = offset + 2;
            }
            offset = ((len & 0x3F) << 8) | low;
            jumped = true;
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return None;
            }
            continue;
        }

        // The two remaining label-type bit patterns are reserved.
        if len & 0xC0 != 0 {
            return None;
        }

        let label = payload.get(offset + 1..offset + 1 + len)?;
        if !name.is_empty() {
            name.push('.');
        }
        for &b in label {
            name.push(b.to_ascii_lowercase() as char);
        }
        if name.len() > MAX_NAME_LEN {
            return None;
        }
        offset += 1 + len;
    }

    Some((name, return_offset))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn query(name: &str) -> Vec<u8> {
        let mut p = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        for label in name.split('.') {
            p.push(label.len() as u8);
            p.extend_from_slice(label.as_bytes());
        }
        p.push(0);
        p.extend_from_slice(&[0, 1, 0, 1]); // QTYPE=A, QCLASS=IN
        p
    }

    #[test]
    fn extracts_first_question() {
        let p = query("open.sesame.example");
        assert_eq!(
            first_query_name(&p).as_deref(),
            Some("open.sesame.example")
        );
    }

    #[test]
    fn lowercases_name() {
        let p = query("Open.SESAME.Example");
        assert_eq!(
            first_query_name(&p).as_deref(),
            Some("open.sesame.example")
        );
    }

    #[test]
    fn ignores_responses() {
        let mut p = query("open.sesame.example");
        p[2] |= 0x80; // QR=1
        assert_eq!(first_query_name(&p), None);
    }

    #[test]
    fn ignores_zero_question_count() {
        let mut p = query("open.sesame.example");
        p[5] = 0;
        assert_eq!(first_query_name(&p), None);
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(first_query_name(&[0x12, 0x34, 0x01]), None);
    }

    #[test]
    fn rejects_truncated_label() {
        let mut p = query("open.sesame.example");
        p.truncate(p.len() - 8); // cut into the qname
        assert_eq!(first_query_name(&p), None);
    }

    #[test]
    fn follows_compression_pointer() {
        // Name data at offset 12 ("example"), question name at 21 is a
        // pointer back to it prefixed with one literal label.
        let mut p = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        p.push(7);
        p.extend_from_slice(b"example");
        p.push(0); // offset 12..21
        p.push(4);
        p.extend_from_slice(b"mail");
        p.extend_from_slice(&[0xC0, 12]); // pointer to offset 12
        p.extend_from_slice(&[0, 1, 0, 1]);

        let (name, next) = parse_name(&p, 21).unwrap();
        assert_eq!(name, "mail.example");
        assert_eq!(next, 28); // label + pointer, not the pointed-to data
    }

    #[test]
    fn rejects_pointer_loop() {
        let mut p = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        p.extend_from_slice(&[0xC0, 12]); // points at itself
        assert_eq!(first_query_name(&p), None);
    }
}
