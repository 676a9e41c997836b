pub mod network {
    pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_TOKEN_COMMAND_MS: u64 = 20_000;
    pub const MAX_REDIRECTS: usize = 10;
    pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
    pub const USER_AGENT: &str = concat!("apibridge/", env!("CARGO_PKG_VERSION"));
}

pub mod auth {
    pub const EXPIRY_MARGIN_MS: u64 = 60_000;
    pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";
    pub const DEFAULT_TOKEN_PATH: &str = "access_token";
    /// Longer advertised lifetimes are clamped to this.
    pub const MAX_TOKEN_LIFETIME_SECS: i64 = 366 * 24 * 60 * 60;
}

pub mod pagination {
    pub const MAX_PAGES: usize = 100;
    pub const NEXT_LINK_FIELD: &str = "@odata.nextLink";
    pub const ITEMS_FIELD: &str = "value";
}

pub mod download {
    pub const URL_FIELDS: &[&str] = &["@microsoft.graph.downloadUrl", "downloadUrl"];
}

pub mod query {
    /// API-level query options passed through even when a schema does not declare them.
    pub const DIRECTIVES: &[&str] = &[
        "$select", "$filter", "$expand", "$orderby", "$top", "$skip", "$search", "$count",
        "$format",
    ];
}

pub mod headers {
    /// Response headers kept on a normalized response.
    pub const KEPT: &[&str] = &[
        "content-type",
        "content-length",
        "content-disposition",
        "etag",
        "location",
        "request-id",
        "client-request-id",
        "retry-after",
    ];
}

pub mod limits {
    pub const ERROR_BODY_MAX_BYTES: usize = 16 * 1024;
    pub const LOG_STRING_MAX_BYTES: usize = 2_048;
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http:", "https:"];
}
