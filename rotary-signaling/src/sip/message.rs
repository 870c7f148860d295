//! A deliberately small SIP message builder/parser: just enough REGISTER /
//! INVITE / ACK / BYE / CANCEL request construction and status-line/header
//! parsing to drive the call manager's transition table over UDP. Not a
//! general-purpose SIP stack — no SDP negotiation, no multipart bodies, no
//! transport failover.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Register,
    Invite,
    Ack,
    Bye,
    Cancel,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
        };
        f.write_str(s)
    }
}

/// Fields shared by every request this client builds.
pub struct RequestParams<'a> {
    pub method: Method,
    pub request_uri: &'a str,
    pub from_uri: &'a str,
    pub from_tag: &'a str,
    pub to_uri: &'a str,
    pub to_tag: Option<&'a str>,
    pub call_id: &'a str,
    pub cseq: u32,
    pub via_branch: &'a str,
    pub local_addr: &'a str,
    pub contact: &'a str,
    pub extra_headers: &'a [(String, String)],
    pub body: &'a str,
}

pub fn build_request(p: &RequestParams<'_>) -> String {
    let to_header = match p.to_tag {
        Some(tag) => format!("<{}>;tag={}", p.to_uri, tag),
        None => format!("<{}>", p.to_uri),
    };
    let mut msg = format!(
        "{method} {uri} SIP/2.0\r\n\
         Via: SIP/2.0/UDP {local};branch={branch}\r\n\
         Max-Forwards: 70\r\n\
         From: <{from}>;tag={from_tag}\r\n\
         To: {to}\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: {cseq} {method}\r\n\
         Contact: <{contact}>\r\n\
         Content-Length: {len}\r\n",
        method = p.method,
        uri = p.request_uri,
        local = p.local_addr,
        branch = p.via_branch,
        from = p.from_uri,
        from_tag = p.from_tag,
        to = to_header,
        call_id = p.call_id,
        cseq = p.cseq,
        contact = p.contact,
        len = p.body.len(),
    );
    for (name, value) in p.extra_headers {
        msg.push_str(&format!("{}: {}\r\n", name, value));
    }
    msg.push_str("\r\n");
    msg.push_str(p.body);
    msg
}

/// A parsed inbound datagram: either a request (first line `METHOD uri
/// SIP/2.0`) or a response (first line `SIP/2.0 code reason`).
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub status_code: Option<u16>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ParsedMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn cseq_method(&self) -> Option<&str> {
        self.header("cseq").and_then(|v| v.split_whitespace().nth(1))
    }

    pub fn to_tag(&self) -> Option<String> {
        self.header("to").and_then(|v| extract_tag(v))
    }

    pub fn call_id(&self) -> Option<&str> {
        self.header("call-id")
    }
}

fn extract_tag(header_value: &str) -> Option<String> {
    header_value
        .split(';')
        .find_map(|part| part.trim().strip_prefix("tag="))
        .map(|s| s.trim_matches('"').to_string())
}

pub fn parse(raw: &str) -> Option<ParsedMessage> {
    let mut lines = raw.split("\r\n");
    let start_line = lines.next()?;

    let (status_code, method) = if let Some(rest) = start_line.strip_prefix("SIP/2.0 ") {
        let code = rest.split_whitespace().next()?.parse::<u16>().ok()?;
        (Some(code), None)
    } else {
        let method = start_line.split_whitespace().next()?.to_string();
        (None, Some(method))
    };

    let mut headers = HashMap::new();
    let mut body_lines = Vec::new();
    let mut in_body = false;
    for line in lines {
        if in_body {
            body_lines.push(line);
            continue;
        }
        if line.is_empty() {
            in_body = true;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Some(ParsedMessage {
        status_code,
        method,
        headers,
        body: body_lines.join("\r\n"),
    })
}

/// Build a response to an inbound request by echoing its Via, From, To,
/// Call-ID and CSeq, the way a UAS response must per RFC 3261 — rather than
/// reconstructing those headers from our own dialog state, which would drift
/// from whatever the peer actually sent.
pub fn build_response(
    request: &ParsedMessage,
    status_code: u16,
    reason: &str,
    local_tag: Option<&str>,
    contact: Option<&str>,
    body: &str,
) -> String {
    let to_header = match (request.header("to"), local_tag) {
        (Some(to), Some(tag)) if !to.contains("tag=") => format!("{to};tag={tag}"),
        (Some(to), _) => to.to_string(),
        (None, _) => String::new(),
    };
    let mut msg = format!(
        "SIP/2.0 {status_code} {reason}\r\n\
         Via: {via}\r\n\
         From: {from}\r\n\
         To: {to}\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: {cseq}\r\n\
         Content-Length: {len}\r\n",
        via = request.header("via").unwrap_or_default(),
        from = request.header("from").unwrap_or_default(),
        to = to_header,
        call_id = request.header("call-id").unwrap_or_default(),
        cseq = request.header("cseq").unwrap_or_default(),
        len = body.len(),
    );
    if let Some(contact) = contact {
        msg.push_str(&format!("Contact: <{contact}>\r\n"));
    }
    msg.push_str("\r\n");
    msg.push_str(body);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line_and_headers() {
        let raw = "SIP/2.0 200 OK\r\nTo: <sip:bob@example.com>;tag=abc\r\nCSeq: 1 INVITE\r\nCall-ID: xyz\r\n\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.status_code, Some(200));
        assert_eq!(parsed.to_tag(), Some("abc".to_string()));
        assert_eq!(parsed.cseq_method(), Some("INVITE"));
        assert_eq!(parsed.call_id(), Some("xyz"));
    }

    #[test]
    fn builds_register_request() {
        let params = RequestParams {
            method: Method::Register,
            request_uri: "sip:example.com",
            from_uri: "sip:alice@example.com",
            from_tag: "tag1",
            to_uri: "sip:alice@example.com",
            to_tag: None,
            call_id: "call1",
            cseq: 1,
            via_branch: "z9hG4bKbranch1",
            local_addr: "192.168.1.5:5060",
            contact: "sip:alice@192.168.1.5:5060",
            extra_headers: &[],
            body: "",
        };
        let msg = build_request(&params);
        assert!(msg.starts_with("REGISTER sip:example.com SIP/2.0\r\n"));
        assert!(msg.contains("Call-ID: call1"));
        assert!(msg.ends_with("Content-Length: 0\r\n\r\n"));
    }
}
