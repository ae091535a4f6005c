use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// RFC 3986 path characters plus `/`, so keys like `Raven/Hilo/Album` map
/// onto the server's nested `/docs/...` paths unchanged
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b'/');

/// Characters left alone in a query-string value
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

/// Percent-encode a document key for use in a URI path.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, PATH_SEGMENT).to_string()
}

/// Percent-encode a query-string value.
pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key_keeps_hierarchy() {
        assert_eq!(encode_key("Raven/Hilo/Album"), "Raven/Hilo/Album");
        assert_eq!(encode_key("albums/1"), "albums/1");
    }

    #[test]
    fn test_encode_key_escapes_reserved() {
        assert_eq!(encode_key("a b"), "a%20b");
        assert_eq!(encode_key("a?b#c"), "a%3Fb%23c");
        assert_eq!(encode_key("100%"), "100%25");
        assert_eq!(encode_key("a+b&c"), "a%2Bb%26c");
        assert_eq!(encode_key("é"), "%C3%A9");
    }

    #[test]
    fn test_encode_query_value() {
        assert_eq!(encode_query_value("Artist:Beatles Year:1969"), "Artist%3ABeatles%20Year%3A1969");
        assert_eq!(encode_query_value("a/b"), "a%2Fb");
    }
}
