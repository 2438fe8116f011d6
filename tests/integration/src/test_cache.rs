//! Response cache integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruststack_web_core::MemoryObjectStore;

    use crate::{TestServer, base_config, http_client};

    #[tokio::test]
    async fn test_should_serve_repeated_requests_from_cache() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("app.js", "v1", "application/javascript");
        let server = TestServer::with_memory(&base_config(), &store).await;
        let client = http_client();

        for _ in 0..3 {
            let resp = client.get(server.url("/app.js")).send().await.expect("request");
            assert_eq!(resp.text().await.expect("body"), "v1");
        }
        store.put("app.js", "v2", "application/javascript");
        let resp = client.get(server.url("/app.js")).send().await.expect("request");
        assert_eq!(resp.text().await.expect("body"), "v1");

        assert_eq!(store.fetch_calls(), 1);
        assert!(!server.cache().is_empty());
    }

    #[tokio::test]
    async fn test_should_hit_store_every_time_when_disabled() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("app.js", "v1", "application/javascript");
        let mut config = base_config();
        config.s3_cache_responses = false;
        let server = TestServer::with_memory(&config, &store).await;
        let client = http_client();

        client.get(server.url("/app.js")).send().await.expect("request");
        store.put("app.js", "v2", "application/javascript");
        let resp = client.get(server.url("/app.js")).send().await.expect("request");
        assert_eq!(resp.text().await.expect("body"), "v2");
        assert_eq!(store.fetch_calls(), 2);
        assert!(server.cache().is_empty());
    }

    #[tokio::test]
    async fn test_should_remember_misses_in_immutable_tree() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut config = base_config();
        config.s3_immutable_tree = true;
        let server = TestServer::with_memory(&config, &store).await;
        let client = http_client();

        let resp = client.get(server.url("/late.html")).send().await.expect("request");
        assert_eq!(resp.status(), 404);
        let calls = (store.fetch_calls(), store.list_calls());

        store.put("late.html", "late", "text/html");
        let resp = client.get(server.url("/late.html")).send().await.expect("request");
        assert_eq!(resp.status(), 404);
        assert_eq!((store.fetch_calls(), store.list_calls()), calls);
    }

    #[tokio::test]
    async fn test_should_not_cache_store_failures() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("app.js", "v1", "application/javascript");
        store.fail_fetch("app.js");
        let mut config = base_config();
        config.s3_immutable_tree = true;
        let server = TestServer::with_memory(&config, &store).await;
        let client = http_client();

        for _ in 0..2 {
            let resp = client.get(server.url("/app.js")).send().await.expect("request");
            assert_eq!(resp.status(), 500);
        }
        assert_eq!(store.fetch_calls(), 2);
    }
}
