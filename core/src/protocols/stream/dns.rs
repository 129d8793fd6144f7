//! DNS question observer.
//!
//! Parses DNS messages with the [dns-parser](https://docs.rs/dns-parser)
//! crate and surfaces the question section. Run on UDP port 53 traffic in
//! either direction.

/// One question from a DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// Queried name, dot-separated.
    pub name: String,
    /// Query type code (1 = A, 28 = AAAA, ...).
    pub qtype: u16,
    /// Query class code (1 = IN).
    pub qclass: u16,
}

/// Extracts the question section from a DNS message, or `None` if `data`
/// does not parse as DNS.
pub fn parse_questions(data: &[u8]) -> Option<Vec<DnsQuestion>> {
    let packet = dns_parser::Packet::parse(data).ok()?;
    let questions = packet
        .questions
        .iter()
        .map(|q| DnsQuestion {
            name: q.qname.to_string(),
            qtype: q.qtype as u16,
            qclass: q.qclass as u16,
        })
        .collect();
    Some(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    // id 0x1234, RD, one question: example.com A IN
    fn sample_query() -> Vec<u8> {
        let mut data = vec![
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        data.extend_from_slice(b"\x07example\x03com\x00");
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        data
    }

    #[test]
    fn core_dns_parses_question() {
        let questions = parse_questions(&sample_query()).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].name, "example.com");
        assert_eq!(questions[0].qtype, 1);
        assert_eq!(questions[0].qclass, 1);
    }

    #[test]
    fn core_dns_rejects_garbage() {
        assert!(parse_questions(b"not dns at all").is_none());
        assert!(parse_questions(&[0u8; 4]).is_none());
    }
}
