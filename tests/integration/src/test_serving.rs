//! Request serving integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruststack_web_core::{MemoryObjectStore, WebConfig};

    use crate::{TestServer, base_config, http_client};

    fn site() -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("public/index.html", "<h1>home</h1>", "text/html");
        store.put("public/app.js", "console.log('app')", "application/javascript");
        store.put("public/docs/index.html", "<h1>docs</h1>", "text/html");
        store.put("public/docs/guide.html", "<h1>guide</h1>", "text/html");
        store.put("public/404.html", "<h1>not found</h1>", "text/html");
        store
    }

    fn site_config() -> WebConfig {
        let mut config = base_config();
        config.s3_folder = "public".to_owned();
        config.default_404_file = "404.html".to_owned();
        config.cache_control_regexp_list = vec![r"\.js$".to_owned()];
        config.cache_control_max_age = 31_536_000;
        config
    }

    #[tokio::test]
    async fn test_should_serve_root_index() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let resp = http_client().get(server.url("/")).send().await.expect("request");

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/html");
        assert_eq!(resp.headers()["cache-control"], "public, no-cache");
        assert!(resp.headers().contains_key("x-request-id"));
        assert_eq!(resp.text().await.expect("body"), "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_should_serve_folder_index_with_and_without_slash() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let client = http_client();

        for path in ["/docs/", "/docs"] {
            let resp = client.get(server.url(path)).send().await.expect("request");
            assert_eq!(resp.status(), 200, "{path}");
            assert_eq!(resp.text().await.expect("body"), "<h1>docs</h1>");
        }
    }

    #[tokio::test]
    async fn test_should_mark_matching_paths_immutable() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let resp = http_client().get(server.url("/app.js")).send().await.expect("request");

        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()["cache-control"],
            "public, max-age=31536000, immutable"
        );
    }

    #[tokio::test]
    async fn test_should_serve_default_404_page() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let resp = http_client()
            .get(server.url("/missing.js"))
            .send()
            .await
            .expect("request");

        assert_eq!(resp.status(), 404);
        assert_eq!(resp.headers()["cache-control"], "public, no-cache");
        assert_eq!(resp.text().await.expect("body"), "<h1>not found</h1>");
    }

    #[tokio::test]
    async fn test_should_return_empty_404_without_default_page() {
        let mut config = site_config();
        config.default_404_file = String::new();
        let server = TestServer::with_memory(&config, &site()).await;
        let resp = http_client().get(server.url("/missing")).send().await.expect("request");

        assert_eq!(resp.status(), 404);
        assert!(resp.text().await.expect("body").is_empty());
    }

    #[tokio::test]
    async fn test_should_redirect_to_canonical_path() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let client = http_client();

        let resp = client
            .get(server.url("/docs//guide.html"))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()["location"], "/docs/guide.html");

        let resp = client.get(server.url("/docs//")).send().await.expect("request");
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()["location"], "/docs/");
    }

    #[tokio::test]
    async fn test_should_answer_head_without_body() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let resp = http_client().head(server.url("/app.js")).send().await.expect("request");

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-length"], "18");
        assert!(resp.bytes().await.expect("body").is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_unsupported_methods() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let resp = http_client()
            .delete(server.url("/app.js"))
            .send()
            .await
            .expect("request");

        assert_eq!(resp.status(), 405);
        assert_eq!(resp.headers()["allow"], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_should_answer_health_check() {
        let server = TestServer::with_memory(&site_config(), &site()).await;
        let resp = http_client().get(server.url("/_health")).send().await.expect("request");

        assert_eq!(resp.status(), 200);
        let json: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(json["status"], "running");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_should_follow_gatsby_redirect_pages() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put(
            "old/index.html",
            "<script>window.location.href=\"/new/\"</script>\n",
            "text/html",
        );
        let mut config = base_config();
        config.handle_gatsby_redirects = true;
        let server = TestServer::with_memory(&config, &store).await;

        let resp = http_client().get(server.url("/old/")).send().await.expect("request");
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()["location"], "/new/");
    }

    #[tokio::test]
    async fn test_should_return_500_on_store_failure() {
        let store = site();
        store.fail_fetch("public/app.js");
        let server = TestServer::with_memory(&site_config(), &store).await;

        let resp = http_client().get(server.url("/app.js")).send().await.expect("request");
        assert_eq!(resp.status(), 500);
    }
}
