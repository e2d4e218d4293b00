use std::path::{Component, Path, PathBuf};

use actix_files::NamedFile;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};

use super::error_response;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/uploads/{path:.*}").route(web::get().to(serve_upload)));
}

/// Resolve a request path below `root`, refusing anything that could escape it
pub fn resolve_upload_path(root: &Path, requested: &str) -> Option<PathBuf> {
    if requested.is_empty() || requested.contains('\\') || requested.contains('\0') {
        return None;
    }

    let relative = Path::new(requested);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let candidate = root.join(relative);
    let canonical_root = root.canonicalize().ok()?;
    let canonical = candidate.canonicalize().ok()?;
    if canonical.starts_with(&canonical_root) && canonical.is_file() {
        Some(canonical)
    } else {
        None
    }
}

async fn serve_upload(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let Some(file) = resolve_upload_path(&state.config.upload_folder, &path) else {
        return error_response(StatusCode::NOT_FOUND, "File not found");
    };

    match NamedFile::open_async(&file).await {
        Ok(named) => named.into_response(&req),
        Err(e) => {
            log::warn!("Failed to open upload {}: {}", file.display(), e);
            error_response(StatusCode::NOT_FOUND, "File not found")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, App};

    #[test]
    fn test_resolve_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        std::fs::create_dir_all(root.join("resumes")).unwrap();
        std::fs::write(root.join("resumes/cv.txt"), "cv").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();

        assert!(resolve_upload_path(&root, "resumes/cv.txt").is_some());
        assert!(resolve_upload_path(&root, "../secret.txt").is_none());
        assert!(resolve_upload_path(&root, "resumes/../../secret.txt").is_none());
        assert!(resolve_upload_path(&root, "/etc/passwd").is_none());
        assert!(resolve_upload_path(&root, "resumes\\..\\..\\secret.txt").is_none());
        assert!(resolve_upload_path(&root, "resumes").is_none());
        assert!(resolve_upload_path(&root, "resumes/missing.txt").is_none());
    }

    #[actix_web::test]
    async fn test_serves_uploaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        std::fs::create_dir_all(state.config.resume_folder()).unwrap();
        std::fs::write(state.config.resume_folder().join("cv.txt"), "Hello CV").unwrap();
        let app = actix_test::init_service(App::new().app_data(state).configure(config)).await;

        let req = actix_test::TestRequest::get().uri("/uploads/resumes/cv.txt").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(actix_test::read_body(resp).await, "Hello CV");

        let req = actix_test::TestRequest::get().uri("/uploads/resumes/nope.txt").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
