use std::sync::Arc;

use axum::extract::MatchedPath;
use http::{HeaderName, HeaderValue, Method, header};
use tower::ServiceBuilder;
use tower_http::{
	ServiceBuilderExt as _,
	cors::{self, CorsLayer},
	set_header::SetResponseHeaderLayer,
	trace::{DefaultOnFailure, TraceLayer},
};
use tracing::Level;
use typing_core::Result;
use typing_service::Services;

use crate::router;

/// Wraps the assembled router (§6 client + federation endpoints) in the
/// same middleware shape the teacher's own router crate uses: request
/// tracing, a couple of defensive response headers, and a permissive CORS
/// policy scoped to the two methods this surface actually exposes.
pub(crate) fn build(services: Arc<Services>) -> Result<axum::routing::IntoMakeService<axum::Router>> {
	let middlewares = ServiceBuilder::new()
		.sensitive_headers([header::AUTHORIZATION])
		.layer(
			TraceLayer::new_for_http()
				.make_span_with(tracing_span::<_>)
				.on_failure(DefaultOnFailure::new().level(Level::INFO)),
		)
		.layer(SetResponseHeaderLayer::if_not_present(
			header::X_CONTENT_TYPE_OPTIONS,
			HeaderValue::from_static("nosniff"),
		))
		.layer(cors_layer());

	Ok(router::build(services).layer(middlewares).into_make_service())
}

fn cors_layer() -> CorsLayer {
	const METHODS: [Method; 2] = [Method::PUT, Method::OPTIONS];

	let headers = [
		header::CONTENT_TYPE,
		HeaderName::from_static("x-typing-sender"),
	];

	CorsLayer::new()
		.allow_origin(cors::Any)
		.allow_methods(METHODS)
		.allow_headers(headers)
}

fn tracing_span<T>(request: &http::Request<T>) -> tracing::Span {
	let path = request
		.extensions()
		.get::<MatchedPath>()
		.map_or_else(|| request.uri().path(), MatchedPath::as_str);

	tracing::info_span!("router", %path)
}
