//! Services mounted on the HTTP server.
//!
//! ```text
//! GET    /rest                  LIST
//! GET    /rest/<db>             LIST <db>
//! GET    /rest/<db>/<path>      GET <db>/<path>
//! PUT    /rest/<db>/<path>      PUT <db>/<path>\n<body>    → 201
//! DELETE /rest/<db>             DROP <db>
//! DELETE /rest/<db>/<path>      DELETE <db>/<path>
//! any    /rest...?command=<c>   <c>
//! ```

use axum::http::{Method, StatusCode};

use crate::http::context::RequestContext;
use crate::http::dispatch::{ServiceError, ServiceHandler};
use crate::http::response::SerializerOptions;

/// Resource access over the database command language.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestService;

impl RestService {
    pub const MOUNT: &'static str = "/rest";
}

impl ServiceHandler for RestService {
    fn mount(&self) -> &'static str {
        Self::MOUNT
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<(), ServiceError> {
        let mut options = SerializerOptions::from_params(ctx.params());
        if ctx.param("method").is_none() {
            if let Some(method) = ctx
                .produces()
                .ok()
                .and_then(|types| types.iter().find_map(|t| method_for(t)))
            {
                options.method = method.to_string();
            }
        }

        if let Some(command) = ctx.param("command").map(str::to_string) {
            return query(ctx, &command, &options).await;
        }

        let method = ctx.method().clone();
        let db = ctx.db().map(str::to_string);
        let path = ctx.db_path();

        match (method, db) {
            (Method::GET, None) => query(ctx, "LIST", &options).await,
            (Method::GET, Some(db)) if path.is_empty() => {
                query(ctx, &format!("LIST {db}"), &options).await
            }
            (Method::GET, Some(db)) => query(ctx, &format!("GET {db}/{path}"), &options).await,
            (Method::PUT, Some(db)) if !path.is_empty() => {
                let content = std::str::from_utf8(ctx.body())
                    .map_err(|e| ServiceError::Input(format!("Request body is not UTF-8: {e}")))?
                    .to_string();
                ctx.session()
                    .await?
                    .execute(&format!("PUT {db}/{path}\n{content}"))
                    .await?;
                let message = format!("Resource \"{db}/{path}\" was stored.");
                ctx.status(StatusCode::CREATED, Some(&message)).await;
                Ok(())
            }
            (Method::DELETE, Some(db)) => {
                let command = if path.is_empty() {
                    format!("DROP {db}")
                } else {
                    format!("DELETE {db}/{path}")
                };
                let info = ctx.session().await?.execute(&command).await?;
                ctx.status(StatusCode::OK, Some(&info)).await;
                Ok(())
            }
            (Method::PUT | Method::DELETE, _) => Err(ServiceError::http(
                StatusCode::BAD_REQUEST,
                "No resource path specified.",
            )),
            (other, _) => Err(ServiceError::http(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method not supported: {other}"),
            )),
        }
    }
}

/// Run a command and write its result with the given serialization settings.
async fn query(
    ctx: &mut RequestContext,
    command: &str,
    options: &SerializerOptions,
) -> Result<(), ServiceError> {
    let result = ctx.session().await?.execute(command).await?;
    ctx.init_response(options)?;
    ctx.write(result.as_bytes());
    Ok(())
}

/// Output method matching an accepted media type.
fn method_for(media_type: &str) -> Option<&'static str> {
    match media_type {
        "application/xml" | "text/xml" => Some("xml"),
        "application/json" => Some("json"),
        "text/html" => Some("html"),
        "application/octet-stream" => Some("raw"),
        "text/plain" => Some("text"),
        _ => None,
    }
}

/// A service whose engine is not part of this server; always answers 501.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedService {
    mount: &'static str,
    name: &'static str,
}

impl UnsupportedService {
    pub const fn webdav() -> Self {
        Self {
            mount: "/webdav",
            name: "WebDAV",
        }
    }

    pub const fn restxq() -> Self {
        Self {
            mount: "/restxq",
            name: "RESTXQ",
        }
    }
}

impl ServiceHandler for UnsupportedService {
    fn mount(&self) -> &'static str {
        self.mount
    }

    async fn run(&self, _ctx: &mut RequestContext) -> Result<(), ServiceError> {
        Err(ServiceError::http(
            StatusCode::NOT_IMPLEMENTED,
            format!("{} is not available.", self.name),
        ))
    }
}
