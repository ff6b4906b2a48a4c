//! One-time `?token=` handoff in the page URL.

use url::Url;

/// Query parameter the federated login uses to hand the token to the page.
pub const TOKEN_PARAM: &str = "token";

/// Split a token out of `url`.
///
/// Returns the token and the same URL with every `token` parameter removed
/// (other parameters and the fragment keep their order). An empty value is
/// not a token.
pub fn take_token(url: &Url) -> Option<(String, Url)> {
    let token = url
        .query_pairs()
        .find(|(k, _)| k == TOKEN_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())?;

    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut clean = url.clone();
    if remaining.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(remaining);
    }

    Some((token, clean))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_token() {
        let url = Url::parse("http://localhost:3000/dashboard?token=abc.def").unwrap();
        let (token, clean) = take_token(&url).unwrap();
        assert_eq!(token, "abc.def");
        assert_eq!(clean.as_str(), "http://localhost:3000/dashboard");
    }

    #[test]
    fn test_keeps_other_params() {
        let url = Url::parse("http://localhost:3000/dashboard?tab=all&token=t1#top").unwrap();
        let (token, clean) = take_token(&url).unwrap();
        assert_eq!(token, "t1");
        assert_eq!(clean.as_str(), "http://localhost:3000/dashboard?tab=all#top");
    }

    #[test]
    fn test_no_token() {
        let url = Url::parse("http://localhost:3000/dashboard?tab=all").unwrap();
        assert!(take_token(&url).is_none());

        let url = Url::parse("http://localhost:3000/dashboard?token=").unwrap();
        assert!(take_token(&url).is_none());
    }
}
