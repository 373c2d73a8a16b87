use std::collections::HashMap;

use super::GatewayError;

pub(crate) const SERVICE_NAME: &str = "taskmate-session";

fn attributes(server: &str) -> HashMap<&str, &str> {
    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("server", server);
    attrs
}

/// Store the session refresh token in the system keyring via Secret Service.
pub async fn store_refresh_token(server: &str, token: &str) -> Result<(), GatewayError> {
    let keyring = oo7::Keyring::new()
        .await
        .map_err(|e| GatewayError::Keyring(format!("failed to connect: {}", e)))?;

    keyring
        .create_item(
            &format!("TaskMate session ({})", server),
            &attributes(server),
            token.as_bytes(),
            true, // replace existing
        )
        .await
        .map_err(|e| GatewayError::Keyring(format!("failed to store session: {}", e)))?;

    Ok(())
}

/// Load the refresh token saved by the last sign-in against `server`.
pub async fn load_refresh_token(server: &str) -> Result<Option<String>, GatewayError> {
    let keyring = oo7::Keyring::new()
        .await
        .map_err(|e| GatewayError::Keyring(format!("failed to connect: {}", e)))?;

    let items = keyring
        .search_items(&attributes(server))
        .await
        .map_err(|e| GatewayError::Keyring(format!("failed to search: {}", e)))?;

    if let Some(item) = items.first() {
        let secret_bytes = item
            .secret()
            .await
            .map_err(|e| GatewayError::Keyring(format!("failed to read secret: {}", e)))?;
        let token = String::from_utf8(secret_bytes.to_vec())
            .map_err(|e| GatewayError::Keyring(format!("invalid UTF-8 in secret: {}", e)))?;
        if !token.is_empty() {
            return Ok(Some(token));
        }
    }

    Ok(None)
}

/// Forget the persisted session for `server`.
pub async fn delete_refresh_token(server: &str) -> Result<(), GatewayError> {
    let keyring = oo7::Keyring::new()
        .await
        .map_err(|e| GatewayError::Keyring(format!("failed to connect: {}", e)))?;

    let items = keyring
        .search_items(&attributes(server))
        .await
        .map_err(|e| GatewayError::Keyring(format!("failed to search: {}", e)))?;

    for item in items {
        item.delete()
            .await
            .map_err(|e| GatewayError::Keyring(format!("failed to delete: {}", e)))?;
    }

    Ok(())
}
