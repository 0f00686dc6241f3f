//! Versioned protocol constants.
//!
//! The wire envelope carries several long opaque values that the service
//! expects verbatim. They are data, not logic: when the service rotates
//! them, only this configuration needs to change, never the codec. All
//! fields are serde-overridable so a deployment can ship updated values
//! without a rebuild.

use serde::Deserialize;

/// Opaque routing blob sent in envelope slot 3. Captured from live
/// traffic; forwarded unchanged.
const ROUTING_BLOB: &str = "!CAulC1PNAAZT9fabc_VCOh8qxrLC7BA7ADQBEArZ1H9y4NapwcUiZ2CnLfwfqYZzIXcNnMn9P9pENN_t-nTN0MIdYKUcXEwQ5ZCj2Mk6AgAAAKBSAAAADmgBB34AQS2KvoLeZhHFgongSUwPIjrUQ6O0UuRjFUgVsTEmaI0VdOWH5VIkPV3OT38Y65swGd6IgECeOHTY22UCHGCn1XeDmQM3EqtH2LDYWhAbIRh6Y4QroOiTx7JSzd5uD4ClXjlZtdBAXd9LEHqvkatmyDjb9TI68jJ_d_fvR9Di3ajmV64cEamPfGKHxMDs7r7W8HDviVWIlmn5wcUKpy5Xht606IdSCifXdpieQtKOXX_124aiPrI9PAbqphMfNk75IsDfuZ23eJDAf8npSe7JwWs7YoRyG4rhs_ZnksqghIgVwHJuJS2Qx6S-qm5H3hLDmNnqauZV00eoq8MMZyST2jMwBcbF500JhK52jYjf1ew23EU36F3_8Kh6OnhxsEzv36La-rITXUgq-FE9WFu2wHNsdQu3OrIpeL3vQfKyDd5e84qAgLXsOYQMMSZRoec5jOt3O8ZnCXswmtC9lPYUDpjHM9-lrs56B-RCRHhjSKlbAeEr2Yr6Q97Oko-0uIpRTSdwML8HupgMOLmxEPD3k0EWFNRT5_nTXg7jVWB63eA2Xn4eNNIn-e0lV4l3vBqrz7DnpUhqGPZM9WA9nFUR0eaVzuGxs4OD7pN9UETPycLNYb8734ksD-8YFMLQvn3uyJ4-EloAzHO7jsxr4krT0uv1Ct_78W6bN_k5pHNUhyV8qK-IqpHcIJZcWReov0PN5zkRIUsc-RN3JtW8qvsT0HTGN9BL-X_04EHbCaewa2JX_oAgNzeDpMD2cQyLj-geUPp_MKdRYtBD_KpgeRLGZYiPcp6p6BA7IlB4GAzPDRQUP64Y5IzAjlDHXF1aC4X90OrAGNBsruZwBPiHL20Q8cTsZ9otaPlCWIZu2aRO7On4OLYOA95Ra8G6SdSR6d7QHhjf7O45TmE1ps7Tgrxu3dWHukYsCEEoqcY7DXYvo6k4wzbhtue2nfFXwe_Qbu_eNtkLHGrBwj7z45kOdP5Zgn-_7etVR_cIZLBqMEIjHgIle5QAPIXomu0NAqzyzT0wZPb4lNHpPmLONTjbDmEgxoUtP4jgQFcxUmlhmmWlo6r3St87T0qfMJU3dFbueQ8Gz3P9c2ERsNWKdwhqzxhESuv5Gbjj6bed0wQfPD2eTRoohr6R_kVIgEUgIoOqD5CRE8gDq6wFlGmfRQcATgmLN6oB9BlLfs-Vciqehg";

fn default_app_page() -> String {
    "https://gemini.google.com".to_string()
}

fn default_stream_endpoint() -> String {
    "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate"
        .to_string()
}

fn default_upload_endpoint() -> String {
    "https://content-push.googleapis.com/upload/".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_routing_blob() -> String {
    ROUTING_BLOB.to_string()
}

fn default_client_variant() -> String {
    "2f47f911b4ca432724a308d2992110f0".to_string()
}

fn default_build_tag() -> String {
    "boq_assistant-bard-web-server_20230713.13_p0".to_string()
}

fn default_upload_push_id() -> String {
    "feeds/mcudyrk2a4khkz".to_string()
}

fn default_upload_tenant() -> String {
    "bard-storage".to_string()
}

/// Constants the wire codec and transports are parameterized on.
#[derive(Debug, Clone, Deserialize)]
pub struct WireConfig {
    /// Signed-in app page scraped for the token pair.
    #[serde(default = "default_app_page")]
    pub app_page: String,
    /// Streaming generate endpoint.
    #[serde(default = "default_stream_endpoint")]
    pub stream_endpoint: String,
    /// Two-phase media upload endpoint.
    #[serde(default = "default_upload_endpoint")]
    pub upload_endpoint: String,
    /// Language tag sent in envelope slot 1.
    #[serde(default = "default_language")]
    pub language: String,
    /// Opaque routing blob, envelope slot 3.
    #[serde(default = "default_routing_blob")]
    pub routing_blob: String,
    /// Constant client identifier, envelope slot 4.
    #[serde(default = "default_client_variant")]
    pub client_variant: String,
    /// Fallback `bl` build tag when the page scrape yields none.
    #[serde(default = "default_build_tag")]
    pub build_tag: String,
    /// Fixed channel id for the upload init call.
    #[serde(default = "default_upload_push_id")]
    pub upload_push_id: String,
    /// Fixed tenant id for the upload init call.
    #[serde(default = "default_upload_tenant")]
    pub upload_tenant: String,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            app_page: default_app_page(),
            stream_endpoint: default_stream_endpoint(),
            upload_endpoint: default_upload_endpoint(),
            language: default_language(),
            routing_blob: default_routing_blob(),
            client_variant: default_client_variant(),
            build_tag: default_build_tag(),
            upload_push_id: default_upload_push_id(),
            upload_tenant: default_upload_tenant(),
        }
    }
}
