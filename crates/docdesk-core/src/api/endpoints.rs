//! Endpoint paths of the auth and document services.

/// Served by the auth service; every other path goes to the data service.
pub const LOGIN: &str = "/api/auth/login";

pub const DOCUMENTS_LIST: &str = "/documents/list";
pub const DOCUMENT_DETAILS: &str = "/documents/list/details";
pub const VECTOR_ADD: &str = "/documents/vector/add";
pub const VECTOR: &str = "/documents/vector";
pub const PROCESS_QUERY: &str = "/documents/vector/process-query";

/// Number of documents per listing page.
pub const PAGE_SIZE: u32 = 10;

/// Ids are opaque and percent-encoded into a single path segment.
pub fn document_details(id: &str) -> String {
    format!("{DOCUMENT_DETAILS}/{}", urlencoding::encode(id))
}

/// Target of update (PUT) and delete (DELETE).
pub fn vector_document(id: &str) -> String {
    format!("{VECTOR}/{}", urlencoding::encode(id))
}

/// Query pairs for one listing page. Pages start at 1.
pub fn list_query(query: &str, page: u32) -> Vec<(String, String)> {
    let skip = page.saturating_sub(1).saturating_mul(PAGE_SIZE);
    let mut pairs = vec![
        ("limit".to_string(), PAGE_SIZE.to_string()),
        ("skip".to_string(), skip.to_string()),
    ];
    let query = query.trim();
    if !query.is_empty() {
        pairs.push(("q".to_string(), query.to_string()));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_pages_and_filter() {
        assert_eq!(
            list_query("", 1),
            vec![
                ("limit".to_string(), "10".to_string()),
                ("skip".to_string(), "0".to_string()),
            ]
        );
        let pairs = list_query(" invoice ", 3);
        assert_eq!(pairs[1], ("skip".to_string(), "20".to_string()));
        assert_eq!(pairs[2], ("q".to_string(), "invoice".to_string()));
    }

    #[test]
    fn test_ids_stay_in_their_segment() {
        assert_eq!(vector_document("65af01"), "/documents/vector/65af01");
        assert_eq!(
            document_details("a/b c"),
            "/documents/list/details/a%2Fb%20c"
        );
        assert_eq!(vector_document("résumé?x=1"), "/documents/vector/r%C3%A9sum%C3%A9%3Fx%3D1");
    }
}
