/// Request methods understood by the server.
///
/// Anything outside this set parses to [`Method::Unknown`] and is answered
/// with `501 Not Implemented`. The set deliberately includes the
/// non-standard `UPDATE` verb alongside the usual ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// An unrecognised verb.
    #[default]
    Unknown,
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `UPDATE`
    Update,
    /// `PATCH`
    Patch,
    /// `OPTIONS`
    Options,
}

impl Method {
    /// Parses a request-line token. Matching is exact; HTTP methods are
    /// case-sensitive.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "UPDATE" => Self::Update,
            "PATCH" => Self::Patch,
            "OPTIONS" => Self::Options,
            _ => Self::Unknown,
        }
    }

    /// The wire form of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Update => "UPDATE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens() {
        assert_eq!(Method::from_token("GET"), Method::Get);
        assert_eq!(Method::from_token("UPDATE"), Method::Update);
        assert_eq!(Method::from_token("OPTIONS"), Method::Options);
    }

    #[test]
    fn test_unknown_tokens() {
        assert_eq!(Method::from_token("BREW"), Method::Unknown);
        assert_eq!(Method::from_token("get"), Method::Unknown);
        assert_eq!(Method::from_token(""), Method::Unknown);
    }
}
