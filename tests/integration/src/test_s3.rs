//! Tests against an S3-compatible endpoint.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aws_sdk_s3::primitives::ByteStream;
    use ruststack_web_core::ObjectStore;
    use ruststack_web_s3::S3ObjectStore;

    use crate::{
        TestServer, cleanup_bucket, create_test_bucket, http_client, s3_client, s3_web_config,
    };

    async fn put(
        client: &aws_sdk_s3::Client,
        bucket: &str,
        key: &str,
        body: &'static [u8],
        content_type: &str,
    ) {
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from_static(body))
            .send()
            .await
            .unwrap_or_else(|e| panic!("put {key}: {e}"));
    }

    #[tokio::test]
    #[ignore = "requires running S3-compatible server"]
    async fn test_should_serve_site_from_bucket() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "web").await;
        put(&client, &bucket, "index.html", b"<h1>home</h1>", "text/html").await;
        put(&client, &bucket, "docs/index.html", b"<h1>docs</h1>", "text/html").await;

        let config = s3_web_config(&bucket);
        let store = S3ObjectStore::from_config(&config).await;
        let server = TestServer::start(&config, Arc::new(store)).await;
        let http = http_client();

        let resp = http.get(server.url("/")).send().await.expect("request");
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/html");
        assert_eq!(resp.text().await.expect("body"), "<h1>home</h1>");

        let resp = http.get(server.url("/docs")).send().await.expect("request");
        assert_eq!(resp.text().await.expect("body"), "<h1>docs</h1>");

        let resp = http.get(server.url("/missing.html")).send().await.expect("request");
        assert_eq!(resp.status(), 404);

        server.stop().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3-compatible server"]
    async fn test_should_classify_missing_key_as_not_found() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "missing").await;

        let store = S3ObjectStore::from_config(&s3_web_config(&bucket)).await;
        let err = store.fetch_object("nope.html").await.expect_err("missing key");
        assert!(err.is_not_found());

        cleanup_bucket(&client, &bucket).await;
    }
}
