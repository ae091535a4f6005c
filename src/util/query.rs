use crate::util::encoding::encode_query_value;

/// Characters a tenant database name may not contain
const INVALID_DATABASE_CHARS: [char; 6] = ['/', '\\', '"', '\'', '<', '>'];

/// Join query terms into the `field:value field:value` form indexes accept
pub fn build_index_query(terms: &[(String, String)]) -> String {
    terms
        .iter()
        .map(|(field, value)| format!("{}:{}", field, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Path and query string for querying an index
pub fn index_query_path(index: &str, terms: &[(String, String)]) -> String {
    let query = build_index_query(terms);
    format!(
        "/indexes/{}?query={}",
        crate::util::encoding::encode_key(index),
        encode_query_value(&query)
    )
}

pub fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(INVALID_DATABASE_CHARS)
}
