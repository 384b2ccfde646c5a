//! The bits of RFC 7230 grammar the tokenizers need, as `regex::bytes`
//! patterns. Everything is compiled once, up front.
//!
//! All patterns carry `(?-u)` so that character classes are byte classes;
//! field values and reason phrases may contain obs-text (0x80-0xFF), which
//! is not valid UTF-8.

use lazy_static::lazy_static;
use regex::bytes::Regex;

pub(crate) static OWS: &str = r"[ \t]*";
// token          = 1*tchar
pub(crate) static TOKEN: &str = r"[-!#$%&'*+.^_`|~0-9a-zA-Z]+";
// field-value here is the RFC 7230 grammar minus obs-fold; leading/trailing
// OWS is captured out by HEADER_FIELD_RE.
pub(crate) static FIELD_VCHAR: &str = r"[^\x00\s]";

lazy_static! {
    static ref FIELD_CONTENT: String =
        format!(r"{fv}+(?:[ \t]+{fv}+)*", fv = FIELD_VCHAR);
    static ref FIELD_VALUE: String = format!("(?:{})?", *FIELD_CONTENT);

    pub(crate) static ref HEADER_FIELD_RE: Regex = Regex::new(&format!(
        r"(?-u)^(?P<field_name>{name}):{ows}(?P<field_value>{value}){ows}$",
        name = TOKEN,
        value = *FIELD_VALUE,
        ows = OWS,
    ))
    .unwrap();

    // request-line = method SP request-target SP HTTP-version
    pub(crate) static ref REQUEST_LINE_RE: Regex = Regex::new(&format!(
        r"(?-u)^(?P<method>{method}) (?P<target>[\x21-\x7e]+) HTTP/(?P<http_version>[0-9]\.[0-9])$",
        method = TOKEN,
    ))
    .unwrap();

    // status-line = HTTP-version SP status-code SP reason-phrase
    // The space after the status code, and the reason itself, are optional
    // on input; some servers skip them.
    pub(crate) static ref STATUS_LINE_RE: Regex = Regex::new(&format!(
        r"(?-u)^HTTP/(?P<http_version>[0-9]\.[0-9]) (?P<status_code>[0-9]{{3}})(?: (?P<reason>(?:[ \t]|{fv})*))?$",
        fv = FIELD_VCHAR,
    ))
    .unwrap();

    // chunk-header = chunk-size [chunk-ext] CRLF. Twenty hex digits is far
    // beyond anything u64 can hold, so oversize chunks fail at integer
    // conversion rather than in the grammar.
    pub(crate) static ref CHUNK_HEADER_RE: Regex =
        Regex::new(&format!(r"(?-u)^(?P<chunk_size>[0-9A-Fa-f]{{1,20}})(?:;.*)?{ows}\r\n$", ows = OWS))
            .unwrap();

    pub(crate) static ref METHOD_RE: Regex =
        Regex::new(&format!(r"(?-u)^{}$", TOKEN)).unwrap();
    pub(crate) static ref REQUEST_TARGET_RE: Regex =
        Regex::new(r"(?-u)^[\x21-\x7e]+$").unwrap();
    pub(crate) static ref FIELD_NAME_RE: Regex =
        Regex::new(&format!(r"(?-u)^{}$", TOKEN)).unwrap();
    pub(crate) static ref FIELD_VALUE_RE: Regex =
        Regex::new(&format!(r"(?-u)^{}$", *FIELD_VALUE)).unwrap();
    pub(crate) static ref CONTENT_LENGTH_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
}
