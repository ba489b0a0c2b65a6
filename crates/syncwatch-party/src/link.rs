//! Share links
//!
//! A host hands out `<base>?party=<id>`; a guest may paste either that link
//! or the bare id.

use syncwatch_core::SHARE_QUERY_PARAM;
use url::Url;

use crate::error::{PartyError, Result};

/// Build the link guests open to join `party_id`
pub fn share_link(base: &str, party_id: &str) -> Result<String> {
    if party_id.trim().is_empty() {
        return Err(PartyError::InvalidPartyId(party_id.to_string()));
    }
    let mut url = Url::parse(base)?;
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair(SHARE_QUERY_PARAM, party_id);
    Ok(url.into())
}

/// Turn user input into a host address.
///
/// `http(s)` links yield their `party` parameter; anything else is taken as
/// the id itself. Blank input or a link without the parameter yields `None`.
pub fn resolve_party_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url
            .query_pairs()
            .find(|(key, _)| key == SHARE_QUERY_PARAM)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        _ => Some(input.to_string()),
    }
}
