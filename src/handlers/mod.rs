use std::fmt;

use serde::de::DeserializeOwned;

use crate::{Deserialization, DeserializationOptions, DeserializeError};

/// Handler to echo back deserialized payloads.
pub async fn echo_handler<T>(payload: T)
where
    T: fmt::Display,
{
    println!("{:#}", payload);
}

/// Deserialize a raw request body with `options` and echo it back.
pub async fn echo_body<T>(
    body: bytes::Bytes,
    options: DeserializationOptions,
    root: &str,
) -> Result<(), DeserializeError>
where
    T: DeserializeOwned + fmt::Display,
{
    let payload: T = match Deserialization::new(options).deserialize(&body, root) {
        Err(e) => {
            log::error!("Failed to deserialize JSON body: {}", e);
            return Err(e);
        }
        Ok(v) => v,
    };

    echo_handler(payload).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;

    use super::*;

    #[tokio::test]
    async fn test_echo_body() {
        let rooted = Bytes::from_static(br#"{"payload": {"id": 1}}"#);
        let bare = Bytes::from_static(br#"{"id": 1}"#);
        let without_root = DeserializationOptions::new().without_root(true);

        assert!(
            echo_body::<Value>(rooted.clone(), DeserializationOptions::new(), "payload")
                .await
                .is_ok()
        );
        assert!(echo_body::<Value>(bare.clone(), without_root, "payload").await.is_ok());

        assert!(matches!(
            echo_body::<Value>(bare, DeserializationOptions::new(), "payload").await,
            Err(DeserializeError::MissingRoot(_))
        ));
        assert!(matches!(
            echo_body::<Value>(Bytes::from_static(b"{"), without_root, "payload").await,
            Err(DeserializeError::Parse(_))
        ));
    }
}
