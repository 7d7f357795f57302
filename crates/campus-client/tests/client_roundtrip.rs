use std::sync::Arc;

use campus_api::auth::{AppStateInner, SentinelAdmin};
use campus_api::storage::Storage;
use campus_client::{ApiClient, ClientError, FeedFilter, NewPost, PostAttachment, Session};
use campus_db::Database;
use campus_types::models::Category;
use tempfile::TempDir;

/// Serve the real router on an ephemeral port.
async fn spawn_server() -> (ApiClient, TempDir) {
    let uploads = tempfile::tempdir().unwrap();
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "client-test-secret".into(),
        sentinel: SentinelAdmin {
            aliases: vec!["admin".into()],
            secret: Some("admin1236".into()),
        },
        storage: Storage::new(uploads.path().to_path_buf()).await.unwrap(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, campus_api::router(state)).await.unwrap();
    });

    (ApiClient::new(format!("http://{addr}")), uploads)
}

#[tokio::test]
async fn feed_and_trust_box_through_the_client() {
    let (client, _uploads) = spawn_server().await;
    assert_eq!(client.health().await.unwrap().status, "ok");

    let anna = client.register("anna@school.ua", "anna", "password123").await.unwrap();
    let bohdan = client.register("bohdan@school.ua", "bohdan", "password123").await.unwrap();
    assert!(!anna.is_admin());

    let mut post = NewPost::text(Category::Question, "Where should the trip go?");
    post.poll = Some(("Destination".into(), vec!["Lviv".into(), "Odesa".into()]));
    post.images.push(PostAttachment {
        file_name: "map.png".into(),
        data: b"not-really-a-png".to_vec(),
    });
    let created = client.create_post(&anna, post).await.unwrap();
    assert_eq!(created.image_urls.len(), 1);
    let option = created.poll.as_ref().unwrap().options[0].id;

    client.vote(&bohdan, option).await.unwrap();
    assert!(client.toggle_like(&bohdan, created.id).await.unwrap());
    client.create_comment(&bohdan, created.id, "Lviv!").await.unwrap();

    let feed = client
        .list_posts(&anna, &FeedFilter { category: Some(Category::Question), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].likes_count, 1);
    assert_eq!(feed[0].comments.len(), 1);
    assert_eq!(feed[0].poll.as_ref().unwrap().options[0].percentage, 100);

    let empty = client
        .list_posts(&anna, &FeedFilter { category: Some(Category::Meme), ..Default::default() })
        .await
        .unwrap();
    assert!(empty.is_empty());

    let sent = client.send_trust_message(&anna, "Need to talk").await.unwrap();
    let admin = client.login("admin", "admin1236").await.unwrap();
    assert!(admin.is_admin());
    let replied = client.reply_trust_message(&admin, sent.id, "Come by on Monday").await.unwrap();
    assert!(replied.is_answered);

    let mine = client.my_trust_messages(&anna).await.unwrap();
    assert_eq!(mine[0].reply.as_deref(), Some("Come by on Monday"));

    client.delete_post(&admin, created.id).await.unwrap();
    assert!(client.list_user_posts(&anna, anna.user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn server_errors_surface_status_and_message() {
    let (client, _uploads) = spawn_server().await;
    let user = client.register("olha@school.ua", "olha", "password123").await.unwrap();

    let err = client
        .register("olha@school.ua", "olha", "password123")
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "User already exists");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = client.all_trust_messages(&user).await.unwrap_err();
    assert_eq!(err.status(), Some(403));

    let forged = Session {
        token: "garbage".into(),
        user: user.user.clone(),
    };
    let err = client.list_posts(&forged, &FeedFilter::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn session_survives_a_restart() {
    let (client, _uploads) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let session = client.register("taras@school.ua", "taras", "password123").await.unwrap();
    session.save(&path).unwrap();

    let restored = Session::load(&path).unwrap().unwrap();
    assert!(client.my_trust_messages(&restored).await.unwrap().is_empty());

    Session::clear(&path).unwrap();
    assert!(Session::load(&path).unwrap().is_none());
}
