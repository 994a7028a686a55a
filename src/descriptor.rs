//! Package declarations and their validated, immutable form
//!
//! A [`Declaration`] is what the host writes (one `[[package]]` table in the
//! manifest). [`PackageDescriptor::from_declaration`] checks it before any I/O
//! happens, so a missing URL or a malformed digest never gets as far as the
//! network.

use serde::Deserialize;
use thiserror::Error;

use crate::command::CommandLine;
use crate::fetch::url::{self, UrlScheme};
use crate::fetch::verify::{DigestError, ExpectedDigest};
use crate::layout::{self, LayoutError};

#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error(transparent)]
    Name(#[from] LayoutError),

    #[error("package '{0}': missing required field 'url'")]
    MissingUrl(String),

    #[error("package '{name}': {source}")]
    Url {
        name: String,
        #[source]
        source: url::UrlError,
    },

    #[error("package '{name}': {source}")]
    Digest {
        name: String,
        #[source]
        source: DigestError,
    },

    #[error("package '{name}': definition '{definition}' must have the form KEY=VALUE")]
    InvalidDefinition { name: String, definition: String },

    #[error("package '{name}': {stage} override must contain at least the program")]
    EmptyOverride { name: String, stage: &'static str },
}

/// One dependency as declared by the host.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub definitions: Vec<String>,
    #[serde(default)]
    pub configure: Option<Vec<String>>,
    #[serde(default)]
    pub build: Option<Vec<String>>,
    #[serde(default)]
    pub install: Option<Vec<String>>,
    #[serde(default, alias = "require_authenticated_transfer")]
    pub require_tls: bool,
    #[serde(default)]
    pub verbose: bool,
}

/// A checked declaration, ready for the pipeline. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    pub url: String,
    pub expected_digest: Option<ExpectedDigest>,
    pub configure: Option<CommandLine>,
    pub build: Option<CommandLine>,
    pub install: Option<CommandLine>,
    /// Ordered caller definitions, passed to the default configure command.
    pub definitions: Vec<(String, String)>,
    pub require_authenticated_transfer: bool,
    pub verbose: bool,
}

impl PackageDescriptor {
    pub fn from_declaration(decl: Declaration) -> Result<Self, DeclarationError> {
        layout::validate_name(&decl.name)?;
        let name = decl.name;

        let url = decl
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| DeclarationError::MissingUrl(name.clone()))?;

        let allowed: &[UrlScheme] = if decl.require_tls {
            &[UrlScheme::Https]
        } else {
            &[UrlScheme::Https, UrlScheme::Http, UrlScheme::File]
        };
        url::validate_url_scheme(&url, allowed).map_err(|source| DeclarationError::Url {
            name: name.clone(),
            source,
        })?;

        let expected_digest = decl
            .digest
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ExpectedDigest::parse)
            .transpose()
            .map_err(|source| DeclarationError::Digest {
                name: name.clone(),
                source,
            })?;

        let definitions = decl
            .definitions
            .iter()
            .map(|def| match def.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.to_string()))
                }
                _ => Err(DeclarationError::InvalidDefinition {
                    name: name.clone(),
                    definition: def.clone(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let configure = parse_override(&name, "configure", decl.configure)?;
        let build = parse_override(&name, "build", decl.build)?;
        let install = parse_override(&name, "install", decl.install)?;

        Ok(Self {
            name,
            url,
            expected_digest,
            configure,
            build,
            install,
            definitions,
            require_authenticated_transfer: decl.require_tls,
            verbose: decl.verbose,
        })
    }

    /// Filename component of the source URL, used to key the download cache.
    pub fn remote_filename(&self) -> String {
        url::extract_filename(&self.url)
    }
}

fn parse_override(
    name: &str,
    stage: &'static str,
    argv: Option<Vec<String>>,
) -> Result<Option<CommandLine>, DeclarationError> {
    match argv {
        None => Ok(None),
        Some(argv) => CommandLine::from_override(&argv)
            .map(Some)
            .ok_or_else(|| DeclarationError::EmptyOverride {
                name: name.to_string(),
                stage,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::verify::HashAlgorithm;

    fn decl(name: &str, url: &str) -> Declaration {
        Declaration {
            name: name.to_string(),
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_declaration() {
        let d = PackageDescriptor::from_declaration(decl(
            "fmt",
            "https://github.com/fmtlib/fmt/archive/11.0.2.tar.gz",
        ))
        .unwrap();

        assert_eq!(d.name, "fmt");
        assert!(d.expected_digest.is_none());
        assert!(d.configure.is_none());
        assert!(d.definitions.is_empty());
        assert_eq!(d.remote_filename(), "11.0.2.tar.gz");
    }

    #[test]
    fn test_missing_url_rejected() {
        let d = Declaration {
            name: "fmt".to_string(),
            ..Default::default()
        };
        let err = PackageDescriptor::from_declaration(d).unwrap_err();
        assert!(matches!(err, DeclarationError::MissingUrl(_)));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = PackageDescriptor::from_declaration(decl("", "https://x/y.tar.gz")).unwrap_err();
        assert!(matches!(err, DeclarationError::Name(LayoutError::EmptyName)));
    }

    #[test]
    fn test_tls_requirement_rejects_plain_http() {
        let mut d = decl("iconv", "http://ftp.gnu.org/libiconv-1.17.tar.gz");
        d.require_tls = true;
        let err = PackageDescriptor::from_declaration(d).unwrap_err();
        assert!(matches!(err, DeclarationError::Url { .. }));

        let mut d = decl("iconv", "http://ftp.gnu.org/libiconv-1.17.tar.gz");
        d.require_tls = false;
        assert!(PackageDescriptor::from_declaration(d).is_ok());
    }

    #[test]
    fn test_definitions_keep_order_and_split_on_first_equals() {
        let mut d = decl("boost", "https://x/boost.tar.gz");
        d.definitions = vec![
            "BOOST_INCLUDE_LIBRARIES=system;filesystem".to_string(),
            "FLAGS=-O2 -DX=1".to_string(),
        ];
        let d = PackageDescriptor::from_declaration(d).unwrap();
        assert_eq!(
            d.definitions,
            vec![
                (
                    "BOOST_INCLUDE_LIBRARIES".to_string(),
                    "system;filesystem".to_string()
                ),
                ("FLAGS".to_string(), "-O2 -DX=1".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let mut d = decl("boost", "https://x/boost.tar.gz");
        d.definitions = vec!["NOEQUALS".to_string()];
        let err = PackageDescriptor::from_declaration(d).unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_empty_override_rejected() {
        let mut d = decl("fmt", "https://x/fmt.tar.gz");
        d.install = Some(vec![]);
        let err = PackageDescriptor::from_declaration(d).unwrap_err();
        assert!(err.to_string().contains("install override"));
    }

    #[test]
    fn test_digest_parsed_at_declaration_time() {
        let mut d = decl("fmt", "https://x/fmt.tar.gz");
        d.digest = Some(
            "SHA256=b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9".to_string(),
        );
        let d = PackageDescriptor::from_declaration(d).unwrap();
        assert_eq!(
            d.expected_digest.map(|e| e.algorithm),
            Some(HashAlgorithm::Sha256)
        );

        let mut bad = decl("fmt", "https://x/fmt.tar.gz");
        bad.digest = Some("MD4=abcd".to_string());
        assert!(matches!(
            PackageDescriptor::from_declaration(bad),
            Err(DeclarationError::Digest { .. })
        ));
    }

    #[test]
    fn test_declaration_from_toml() {
        let decl: Declaration = toml::from_str(
            r#"
name = "catch2"
url = "https://github.com/catchorg/Catch2/archive/v3.7.1.tar.gz"
definitions = ["CATCH_INSTALL_DOCS=OFF"]
require_authenticated_transfer = true
verbose = true
"#,
        )
        .unwrap();

        assert!(decl.require_tls);
        assert!(decl.verbose);
        assert_eq!(decl.definitions, vec!["CATCH_INSTALL_DOCS=OFF"]);
    }
}
