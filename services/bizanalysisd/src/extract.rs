use analysis::Validate;
use axum::{
    async_trait,
    body::HttpBody,
    extract::FromRequest,
    http::Request,
    BoxError, Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body that has been deserialized and passed [`Validate`].
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}
