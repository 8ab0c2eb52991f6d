//! Shareable join links: `?session=<id>[&player=<id>]`.

use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use crate::error::LinkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLink {
    pub session_id: String,
    pub player_id: Option<String>,
}

impl JoinLink {
    /// Lobby link: whoever opens it joins as a new player.
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            player_id: None,
        }
    }

    /// Resume link for an existing player.
    pub fn player(session_id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            player_id: Some(player_id.into()),
        }
    }

    /// Accepts an absolute URL, a relative path with a query, or a bare query
    /// string. `instance` is read as an alias of `session`.
    pub fn parse(input: &str) -> Result<Self, LinkError> {
        let query = match Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) => input
                .split_once('?')
                .map_or(input, |(_, q)| q)
                .to_string(),
        };

        let mut session = None;
        let mut instance = None;
        let mut player = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "session" => session = Some(value.into_owned()),
                "instance" => instance = Some(value.into_owned()),
                "player" => player = Some(value.into_owned()),
                _ => {}
            }
        }

        let session_id = session.or(instance).ok_or(LinkError::MissingSession)?;
        Ok(Self {
            session_id,
            player_id: player,
        })
    }

    /// `base` with its query replaced by this link's parameters.
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear().append_pair("session", &self.session_id);
            if let Some(player) = &self.player_id {
                pairs.append_pair("player", player);
            }
        }
        url
    }

    pub fn is_direct_entry(&self) -> bool {
        self.player_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_relative_and_bare() {
        let full = JoinLink::parse("http://localhost:3000/?session=abc&player=player_4").unwrap();
        assert_eq!(full, JoinLink::player("abc", "player_4"));
        assert!(full.is_direct_entry());
        assert_eq!(JoinLink::parse("/join?session=abc").unwrap(), JoinLink::session("abc"));
        assert_eq!(JoinLink::parse("?session=abc").unwrap(), JoinLink::session("abc"));
        assert_eq!(JoinLink::parse("session=abc").unwrap(), JoinLink::session("abc"));
    }

    #[test]
    fn instance_is_an_alias() {
        assert_eq!(JoinLink::parse("?instance=old").unwrap(), JoinLink::session("old"));
        assert_eq!(
            JoinLink::parse("?instance=old&session=new").unwrap(),
            JoinLink::session("new")
        );
    }

    #[test]
    fn missing_or_empty_session_is_rejected() {
        assert_eq!(JoinLink::parse("/?player=player_1"), Err(LinkError::MissingSession));
        assert_eq!(JoinLink::parse("?session="), Err(LinkError::MissingSession));
        assert_eq!(JoinLink::parse(""), Err(LinkError::MissingSession));
    }

    #[test]
    fn url_round_trips_and_escapes() {
        let base = Url::parse("http://example.test/play?stale=1").unwrap();
        let link = JoinLink::player("a b", "player_2");
        let url = link.to_url(&base);
        assert_eq!(url.as_str(), "http://example.test/play?session=a+b&player=player_2");
        assert_eq!(JoinLink::parse(url.as_str()).unwrap(), link);
    }
}
