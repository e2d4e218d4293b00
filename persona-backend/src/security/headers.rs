use actix_web::middleware::DefaultHeaders;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' https://unpkg.com https://cdn.tailwindcss.com https://cdn.ckeditor.com https://cdn.jsdelivr.net https://cdnjs.cloudflare.com; \
    style-src 'self' 'unsafe-inline' https://fonts.googleapis.com https://cdn.tailwindcss.com; \
    font-src 'self' https://fonts.gstatic.com data:; \
    img-src 'self' data: https:; \
    connect-src 'self' wss: ws: https://unpkg.com https://cdnjs.cloudflare.com https://cdn.jsdelivr.net; \
    frame-ancestors 'none'; \
    base-uri 'self'; \
    form-action 'self'";

const PERMISSIONS_POLICY: &str = "geolocation=(), microphone=(), camera=(), payment=(), usb=(), \
    magnetometer=(), gyroscope=(), accelerometer=()";

/// Headers attached to every response; HSTS only for HTTPS deployments
pub fn security_headers(hsts: bool) -> DefaultHeaders {
    let headers = DefaultHeaders::new()
        .add(("Content-Security-Policy", CONTENT_SECURITY_POLICY))
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("Permissions-Policy", PERMISSIONS_POLICY));

    if hsts {
        headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains",
        ))
    } else {
        headers
    }
}
