use harvest_core::auth::{auth_headers, bearer};

#[test]
fn adds_prefix_to_bare_token() {
    assert_eq!(bearer("abc").as_deref(), Some("Bearer abc"));
}

#[test]
fn keeps_exactly_one_prefix_whatever_the_case() {
    let cases = ["Bearer abc", "BEARER abc", "bearer abc", "bearer Bearer abc", "  Bearer   abc"];
    for case in cases {
        assert_eq!(bearer(case).as_deref(), Some("Bearer abc"), "input: {case:?}");
    }
}

#[test]
fn token_starting_with_bearer_word_is_not_mangled() {
    assert_eq!(bearer("bearerish").as_deref(), Some("Bearer bearerish"));
}

#[test]
fn empty_token_sends_no_header() {
    assert!(auth_headers("").is_empty());
    assert!(auth_headers("  ").is_empty());
    assert!(auth_headers("Bearer ").is_empty());
    assert_eq!(
        auth_headers("abc"),
        vec![("Authorization".to_string(), "Bearer abc".to_string())]
    );
}
