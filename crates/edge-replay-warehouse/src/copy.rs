//! Bulk load (COPY) parameters
//!
//! The option set mirrors how the upstream producer serializes staged rows:
//! gzip-compressed, tab-delimited, with quoted fields. Changing it without
//! changing the producer breaks the load.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::sql::quote_literal;

/// Options appended to every COPY statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    /// Strip surrounding quotes from fields
    pub remove_quotes: bool,
    /// Field delimiter, rendered as a Redshift escape when it is a tab
    pub delimiter: char,
    /// Input files are gzip-compressed
    pub gzip: bool,
    /// Backslash escapes in field data
    pub escape: bool,
    /// Truncate strings that exceed the column width
    pub truncate_columns: bool,
    /// Round decimals instead of truncating
    pub round_decimals: bool,
    /// Pad short rows with NULLs
    pub fill_record: bool,
    /// Let the load recompute column compression
    pub comp_update: bool,
    /// Let the load refresh table statistics
    pub stat_update: bool,
    /// Load blank fields as NULL
    pub empty_as_null: bool,
    /// Replacement for invalid UTF-8 characters
    pub accept_invalid_chars: Option<char>,
    /// Trim whitespace around fields
    pub trim_blanks: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            remove_quotes: true,
            delimiter: '\t',
            gzip: true,
            escape: true,
            truncate_columns: true,
            round_decimals: true,
            fill_record: true,
            comp_update: false,
            stat_update: false,
            empty_as_null: true,
            accept_invalid_chars: Some('?'),
            trim_blanks: true,
        }
    }
}

impl CopyOptions {
    /// Render the option list in COPY syntax
    pub fn to_sql(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(14);
        if self.remove_quotes {
            parts.push("removequotes".into());
        }
        let delimiter = match self.delimiter {
            '\t' => "\\t".to_string(),
            other => other.to_string(),
        };
        parts.push(format!("delimiter {}", quote_literal(&delimiter)));
        if self.gzip {
            parts.push("gzip".into());
        }
        if self.escape {
            parts.push("escape".into());
        }
        if self.truncate_columns {
            parts.push("truncatecolumns".into());
        }
        if self.round_decimals {
            parts.push("roundec".into());
        }
        if self.fill_record {
            parts.push("fillrecord".into());
        }
        parts.push(format!("compupdate {}", on_off(self.comp_update)));
        parts.push(format!("statupdate {}", on_off(self.stat_update)));
        if self.empty_as_null {
            parts.push("emptyasnull".into());
        }
        if let Some(c) = self.accept_invalid_chars {
            parts.push(format!("acceptinvchars {}", quote_literal(&c.to_string())));
        }
        if self.trim_blanks {
            parts.push("trimblanks".into());
        }
        parts.join(" ")
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Staged output location for one table of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Staging bucket
    pub bucket: String,
    /// Run tag namespacing the staged output
    pub run_tag: String,
    /// Table whose staged files are loaded
    pub table: String,
}

impl CopySource {
    /// Create a new copy source
    pub fn new(
        bucket: impl Into<String>,
        run_tag: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            run_tag: run_tag.into(),
            table: table.into(),
        }
    }

    /// Key prefix inside the staging bucket, with trailing slash
    pub fn prefix(&self) -> String {
        format!("{}/{}/", self.run_tag, self.table)
    }

    /// Full `s3://` URI of the staged prefix
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix())
    }
}

/// How the warehouse authenticates against the staging bucket
#[derive(Clone)]
pub enum CopyAuthorization {
    /// Static or temporary access keys
    Keys {
        /// Access key id
        access_key_id: String,
        /// Secret access key
        secret_access_key: SecretString,
        /// Session token of temporary credentials
        session_token: Option<SecretString>,
    },
    /// IAM role attached to the cluster
    IamRole(String),
}

impl CopyAuthorization {
    /// Access-key authorization without a session token
    pub fn keys(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self::Keys {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: None,
        }
    }

    /// Attach a session token to access-key authorization
    pub fn with_session_token(self, token: impl Into<String>) -> Self {
        match self {
            Self::Keys {
                access_key_id,
                secret_access_key,
                ..
            } => Self::Keys {
                access_key_id,
                secret_access_key,
                session_token: Some(SecretString::from(token.into())),
            },
            role => role,
        }
    }

    /// Render the authorization clause. The output contains secrets.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Keys {
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                let mut credentials = format!(
                    "aws_access_key_id={};aws_secret_access_key={}",
                    access_key_id,
                    secret_access_key.expose_secret()
                );
                if let Some(token) = session_token {
                    credentials.push_str(";token=");
                    credentials.push_str(token.expose_secret());
                }
                format!("CREDENTIALS {}", quote_literal(&credentials))
            }
            Self::IamRole(arn) => format!("IAM_ROLE {}", quote_literal(arn)),
        }
    }
}

impl fmt::Debug for CopyAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keys {
                access_key_id,
                session_token,
                ..
            } => f
                .debug_struct("Keys")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"***")
                .field("session_token", &session_token.as_ref().map(|_| "***"))
                .finish(),
            Self::IamRole(arn) => f.debug_tuple("IamRole").field(arn).finish(),
        }
    }
}
