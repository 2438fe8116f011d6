//! Folder listing integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruststack_web_core::MemoryObjectStore;

    use crate::{TestServer, base_config, http_client};

    fn assets(page_size: usize) -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::with_page_size(page_size));
        for key in [
            "assets/",
            "assets/site.css",
            "assets/app.js",
            "assets/img/logo.png",
            "assets/img/icon.png",
            "assets/fonts/a.woff2",
            "assets/print.css",
        ] {
            store.put(key, "x", "application/octet-stream");
        }
        store
    }

    #[tokio::test]
    async fn test_should_list_folder_as_json() {
        let mut config = base_config();
        config.enable_directory_listing = true;
        let server = TestServer::with_memory(&config, &assets(1000)).await;

        let resp = http_client()
            .get(server.url("/assets/"))
            .header("accept", "application/json")
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 200);
        let json: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "files": ["assets/app.js", "assets/print.css", "assets/site.css"],
                "folders": ["assets/fonts/", "assets/img/"],
            })
        );
    }

    #[tokio::test]
    async fn test_should_produce_same_listing_across_page_sizes() {
        let mut config = base_config();
        config.enable_directory_listing = true;
        let client = http_client();

        let mut bodies = Vec::new();
        for page_size in [1, 2, 1000] {
            let server = TestServer::with_memory(&config, &assets(page_size)).await;
            let resp = client.get(server.url("/assets/")).send().await.expect("request");
            assert_eq!(resp.status(), 200);
            bodies.push(resp.text().await.expect("body"));
        }
        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[1], bodies[2]);
    }

    #[tokio::test]
    async fn test_should_list_folder_as_html_for_browsers() {
        let mut config = base_config();
        config.enable_directory_listing = true;
        let server = TestServer::with_memory(&config, &assets(1000)).await;

        let resp = http_client()
            .get(server.url("/assets/"))
            .header("accept", "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
        let page = resp.text().await.expect("body");
        assert!(page.contains("<h1>/assets/</h1>"));
        assert!(page.contains(r#"<li><a href="/assets/fonts/">fonts/</a></li>"#));
        assert!(page.contains(r#"<li><a href="/assets/app.js">app.js</a></li>"#));
        assert!(!page.contains(r#"href="/assets/""#));
    }

    #[tokio::test]
    async fn test_should_forbid_listing_when_disabled() {
        let server = TestServer::with_memory(&base_config(), &assets(1000)).await;
        let resp = http_client().get(server.url("/assets/")).send().await.expect("request");
        assert_eq!(resp.status(), 403);
        assert!(resp.text().await.expect("body").is_empty());
    }

    #[tokio::test]
    async fn test_should_serve_default_403_page() {
        let store = assets(1000);
        store.put("errors/403.html", "<h1>forbidden</h1>", "text/html");
        let mut config = base_config();
        config.default_403_file = "errors/403.html".to_owned();
        let server = TestServer::with_memory(&config, &store).await;

        let resp = http_client().get(server.url("/assets/")).send().await.expect("request");
        assert_eq!(resp.status(), 403);
        assert_eq!(resp.text().await.expect("body"), "<h1>forbidden</h1>");
    }
}
