//! Resolution of the credentials embedded in COPY statements

use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use tracing::debug;

use crate::copy::CopyAuthorization;
use crate::error::{Result, WarehouseError};

/// Resolve access keys from the default AWS credential chain
///
/// Environment variables, profiles and instance roles are all honoured. A
/// session token is included when the chain hands out temporary credentials.
pub async fn resolve_copy_authorization(region: &str) -> Result<CopyAuthorization> {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;

    let provider = config
        .credentials_provider()
        .ok_or_else(|| WarehouseError::Credentials("no AWS credentials provider".into()))?;

    let credentials = provider
        .provide_credentials()
        .await
        .map_err(|e| WarehouseError::Credentials(e.to_string()))?;

    let mut auth = CopyAuthorization::keys(
        credentials.access_key_id(),
        credentials.secret_access_key(),
    );
    if let Some(token) = credentials.session_token() {
        debug!("Using temporary credentials for COPY");
        auth = auth.with_session_token(token);
    }
    Ok(auth)
}
