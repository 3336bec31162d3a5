//! Corral image references: normalized parsing of container image names.
//!
//! Follows the docker reference grammar:
//! - `nginx` → domain `docker.io`, path `library/nginx`
//! - `quay.io/org/app:v1` → domain `quay.io`, path `org/app`, tag `v1`
//! - `localhost:5000/app@sha256:...` → domain `localhost:5000`, path `app`, digest

#![forbid(unsafe_code)]

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*(?::[0-9]+)?$",
    )
    .expect("domain regex")
});
static PATH_COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*$").expect("path regex"));
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag regex"));
static DIGEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$")
        .expect("digest regex")
});
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-f0-9]{64}$").expect("identifier regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageRefError {
    #[error("repository name must have at least one component")]
    Empty,
    #[error("invalid repository name ({0}), cannot specify 64-byte hexadecimal strings")]
    Identifier(String),
    #[error("invalid reference format: repository name must be lowercase")]
    Uppercase,
    #[error("repository name must not be more than 255 characters")]
    NameTooLong,
    #[error("invalid reference format: {0}")]
    Format(String),
    #[error("invalid digest format: {0}")]
    Digest(String),
}

/// A parsed, normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Parse a possibly-familiar image name (`nginx`, `user/app:1`) into its
    /// fully qualified form.
    pub fn parse_normalized(s: &str) -> Result<Self, ImageRefError> {
        if s.is_empty() {
            return Err(ImageRefError::Empty);
        }
        if IDENTIFIER_RE.is_match(s) {
            return Err(ImageRefError::Identifier(s.to_string()));
        }
        let (domain, remainder) = split_docker_domain(s);

        let remote_name = match remainder.find(':') {
            Some(i) => &remainder[..i],
            None => remainder.as_str(),
        };
        if remote_name.to_lowercase() != remote_name {
            return Err(ImageRefError::Uppercase);
        }

        let (name_tag, digest) = match remainder.split_once('@') {
            Some((n, d)) => (n, Some(d)),
            None => (remainder.as_str(), None),
        };
        let (path, tag) = match name_tag.rfind(':') {
            Some(i) => (&name_tag[..i], Some(&name_tag[i + 1..])),
            None => (name_tag, None),
        };

        if !DOMAIN_RE.is_match(&domain) {
            return Err(ImageRefError::Format(format!("invalid domain {:?}", domain)));
        }
        if path.is_empty() || !path.split('/').all(|c| PATH_COMPONENT_RE.is_match(c)) {
            return Err(ImageRefError::Format(format!("invalid repository path {:?}", path)));
        }
        if domain.len() + 1 + path.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(ImageRefError::NameTooLong);
        }
        if let Some(t) = tag {
            if !TAG_RE.is_match(t) {
                return Err(ImageRefError::Format(format!("invalid tag {:?}", t)));
            }
        }
        if let Some(d) = digest {
            if !DIGEST_RE.is_match(d) {
                return Err(ImageRefError::Digest(d.to_string()));
            }
        }

        Ok(Self {
            domain,
            path: path.to_string(),
            tag: tag.map(str::to_string),
            digest: digest.map(str::to_string),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// `domain/path` without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    /// Domain under which registry credentials are registered. Credentials for
    /// the default registry live under `index.docker.io`.
    pub fn credential_domain(&self) -> &str {
        if self.domain == DEFAULT_DOMAIN {
            LEGACY_DEFAULT_DOMAIN
        } else {
            &self.domain
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if let Some(t) = &self.tag {
            write!(f, ":{}", t)?;
        }
        if let Some(d) = &self.digest {
            write!(f, "@{}", d)?;
        }
        Ok(())
    }
}

/// Registry domain used to match credentials for `image`.
pub fn registry_domain(image: &str) -> Result<String, ImageRefError> {
    ImageRef::parse_normalized(image).map(|r| r.credential_domain().to_string())
}

fn split_docker_domain(name: &str) -> (String, String) {
    let (mut domain, mut remainder) = match name.split_once('/') {
        Some((head, tail))
            if head.contains('.') || head.contains(':') || head == "localhost" =>
        {
            (head.to_string(), tail.to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
    };
    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{}{}", OFFICIAL_REPO_PREFIX, remainder);
    }
    (domain, remainder)
}
