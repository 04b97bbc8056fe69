//! Request extractors whose rejections answer like every other error.

use axum::async_trait;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, RequestParts};
use axum::extract::{Path as AxumPath, Query as AxumQuery};
use axum::{Form as AxumForm, Json as AxumJson};

use crate::err::Error;

macro_rules! detailed_extractor {
    ($(#[$doc:meta])* $name:ident wraps $inner:ident rejecting $rejection:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name<T>(pub T);

        #[async_trait]
        impl<T, B> FromRequest<B> for $name<T>
        where
            $inner<T>: FromRequest<B, Rejection = $rejection>,
            B: Send,
        {
            type Rejection = Error;

            async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
                let value = $inner::<T>::from_request(req).await?;
                Ok(Self(value.0))
            }
        }
    };
}

detailed_extractor!(
    /// JSON request body.
    Json wraps AxumJson rejecting JsonRejection
);
detailed_extractor!(
    /// URL-encoded form body.
    Form wraps AxumForm rejecting FormRejection
);
detailed_extractor!(Path wraps AxumPath rejecting PathRejection);
detailed_extractor!(Query wraps AxumQuery rejecting QueryRejection);
