use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// `encodeURIComponent` rules: everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Query keys additionally keep `$` so API directives stay readable.
const QUERY_KEY: &AsciiSet = &URI_COMPONENT.remove(b'$');

pub fn encode_path_segment(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

pub fn encode_query_key(key: &str) -> String {
    utf8_percent_encode(key, QUERY_KEY).to_string()
}

pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}
