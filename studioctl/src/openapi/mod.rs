//! OpenAPI documentation for the client API at `/api/v1/*`, served with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// The three ways a request can be authenticated
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.security_schemes.insert(
            "BearerAuth".to_string(),
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Session token issued by the identity provider."))
                    .build(),
            ),
        );
        components.security_schemes.insert(
            "CookieAuth".to_string(),
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "studio_session",
                "The same session token, in the session cookie.",
            ))),
        );
        components.security_schemes.insert(
            "ProxyHeader".to_string(),
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "x-studio-account",
                "Account email set by a trusted authenticating proxy.",
            ))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Creative Studio API",
        description = "Make pictures, stories and songs. Every creation uses one unit of the account's quota."
    ),
    servers((url = "/api/v1")),
    paths(
        api::handlers::accounts::get_current_account,
        api::handlers::accounts::get_current_usage,
        api::handlers::accounts::update_account,
        api::handlers::usage::track_usage,
        api::handlers::creations::create_image,
        api::handlers::creations::continue_story,
        api::handlers::creations::submit_music,
        api::handlers::creations::list_creations,
        api::handlers::creations::get_creation,
        api::handlers::organizations::create_organization,
        api::handlers::organizations::get_organization,
        api::handlers::organizations::update_organization,
        api::handlers::organizations::get_organization_usage,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "accounts", description = "The signed in account and its quota"),
        (name = "usage", description = "Check and reserve"),
        (name = "creations", description = "Images, stories and songs"),
        (name = "organizations", description = "Schools and districts"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_every_route() {
        let spec = ApiDoc::openapi();
        for path in [
            "/accounts/current",
            "/accounts/current/usage",
            "/accounts/{id}",
            "/usage/track",
            "/creations",
            "/creations/{id}",
            "/creations/images",
            "/creations/stories",
            "/creations/music",
            "/organizations",
            "/organizations/{id}",
            "/organizations/{id}/usage",
        ] {
            assert!(spec.paths.paths.contains_key(path), "{path} missing from OpenAPI spec");
        }
        let schemes = &spec.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("BearerAuth"));
        assert!(schemes.contains_key("ProxyHeader"));
    }
}
