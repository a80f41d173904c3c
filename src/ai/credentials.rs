use keyring::Entry;

const SERVICE_NAME: &str = "com.parafile.organizer";

/// Environment variable consulted before the keychain (loaded from `.env`
/// via dotenvy in the binary)
const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Credential manager using the platform keychain with an environment
/// variable override for headless and development use
pub struct CredentialManager;

impl CredentialManager {
    /// Store an API key in the platform keychain
    pub fn store_api_key(provider: &str, api_key: &str) -> Result<(), String> {
        let entry = Entry::new(SERVICE_NAME, provider)
            .map_err(|e| format!("Keychain unavailable: {}", e))?;
        entry
            .set_password(api_key)
            .map_err(|e| format!("Failed to store API key: {}", e))?;
        tracing::debug!("[Credentials] Stored API key for: {}", provider);
        Ok(())
    }

    /// Get an API key, preferring the environment over the keychain
    pub fn get_api_key(provider: &str) -> Result<String, String> {
        if provider == "openai" {
            if let Ok(key) = std::env::var(ENV_API_KEY) {
                if !key.trim().is_empty() {
                    return Ok(key);
                }
            }
        }

        if let Ok(entry) = Entry::new(SERVICE_NAME, provider) {
            if let Ok(password) = entry.get_password() {
                return Ok(password);
            }
        }

        Err(format!("API key not found for {}", provider))
    }

    /// Delete an API key from the keychain
    pub fn delete_api_key(provider: &str) -> Result<(), String> {
        if let Ok(entry) = Entry::new(SERVICE_NAME, provider) {
            let _ = entry.delete_credential();
            tracing::debug!("[Credentials] Deleted API key for: {}", provider);
        }
        Ok(())
    }

    /// Check if an API key is configured
    pub fn has_api_key(provider: &str) -> bool {
        Self::get_api_key(provider).is_ok()
    }
}
