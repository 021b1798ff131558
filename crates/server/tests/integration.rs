//! Bus server driven by generated-style client calls over the in-process bus.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use {
    async_graphql::{Context, EmptySubscription, ID, Object, Schema, SimpleObject, Subscription},
    bytes::Bytes,
    futures::{Stream, StreamExt, stream},
    gqlbus_protocol::{ResponseEnvelope, WireRequest, error_codes},
    gqlbus_runtime::{
        CallContext, ClientError, ClientOptions, Codec, MemoryBus, Operation, OperationKind,
        RemoteService, Transport,
    },
    gqlbus_server::{BusServer, Credentials, ServerOptions},
    serde::{Deserialize, Serialize},
    serde_json::json,
    tokio::{task::JoinHandle, time::timeout},
    tokio_util::sync::CancellationToken,
};

// ── Schema under test ───────────────────────────────────────────────────────

#[derive(SimpleObject)]
struct UserObject {
    id: ID,
    name: String,
}

struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn user(&self, id: ID) -> async_graphql::Result<UserObject> {
        if id.as_str() == "missing" {
            return Err("user not found".into());
        }
        Ok(UserObject {
            name: format!("user-{}", id.as_str()),
            id,
        })
    }

    async fn whoami(&self, ctx: &Context<'_>) -> Option<String> {
        ctx.data_opt::<Credentials>().map(|c| c.0.clone())
    }
}

struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn rename(&self, id: ID, name: String) -> UserObject {
        UserObject { id, name }
    }
}

struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    async fn countdown(&self, from: i32) -> impl Stream<Item = i32> {
        stream::iter((0..=from).rev())
    }

    async fn ticks(&self) -> impl Stream<Item = i32> {
        stream::unfold(0, |n| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Some((n, n + 1))
        })
    }
}

type TestSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

fn schema() -> TestSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot).finish()
}

// ── Operations as the generator would emit them ─────────────────────────────

const GET_USER: Operation = Operation {
    name: "GetUser",
    kind: OperationKind::Query,
    document: "query GetUser($id: ID!) { user(id: $id) { id name } }",
};

const WHO_AM_I: Operation = Operation {
    name: "WhoAmI",
    kind: OperationKind::Query,
    document: "query WhoAmI { whoami }",
};

const RENAME: Operation = Operation {
    name: "Rename",
    kind: OperationKind::Mutation,
    document: "mutation Rename($id: ID!, $name: String!) { rename(id: $id, name: $name) { id name } }",
};

const COUNTDOWN: Operation = Operation {
    name: "Countdown",
    kind: OperationKind::Subscription,
    document: "subscription Countdown($from: Int!) { countdown(from: $from) }",
};

const TICKS: Operation = Operation {
    name: "Ticks",
    kind: OperationKind::Subscription,
    document: "subscription Ticks { ticks }",
};

#[derive(Serialize)]
struct IdVars {
    id: String,
}

#[derive(Serialize)]
struct RenameVars {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct FromVars {
    from: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetUserData {
    user: User,
}

#[derive(Debug, Deserialize)]
struct WhoAmIData {
    whoami: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenameData {
    rename: User,
}

#[derive(Debug, Deserialize)]
struct CountdownData {
    countdown: i32,
}

#[derive(Debug, Deserialize)]
struct TicksData {
    ticks: i32,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

async fn start(bus: &MemoryBus, codec: Codec) -> (CancellationToken, JoinHandle<()>) {
    let server = BusServer::new(
        "users",
        schema(),
        Arc::new(bus.clone()) as Arc<dyn Transport>,
        ServerOptions { path: None, codec },
    );
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { server.serve(token).await.unwrap() });
    wait_for(|| bus.interest("users/GetUser") > 0).await;
    (shutdown, handle)
}

fn client(bus: &MemoryBus, codec: Codec) -> RemoteService {
    RemoteService::new(
        "users",
        Arc::new(bus.clone()) as Arc<dyn Transport>,
        ClientOptions::default()
            .with_codec(codec)
            .with_timeout(Duration::from_secs(2)),
    )
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ── Request/reply ───────────────────────────────────────────────────────────

#[tokio::test]
async fn query_round_trip_with_both_codecs() {
    for codec in Codec::ALL {
        let bus = MemoryBus::new();
        let (shutdown, _server) = start(&bus, codec).await;
        let data: GetUserData = client(&bus, codec)
            .execute(&CallContext::new(), &GET_USER, &IdVars { id: "7".into() })
            .await
            .unwrap();
        assert_eq!(data.user, User {
            id: "7".into(),
            name: "user-7".into()
        });
        shutdown.cancel();
    }
}

#[tokio::test]
async fn resolver_error_reaches_client_as_remote_error() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;
    let err = client(&bus, Codec::Json)
        .execute::<_, GetUserData>(&CallContext::new(), &GET_USER, &IdVars {
            id: "missing".into(),
        })
        .await
        .unwrap_err();
    let remote = err.remote().expect("remote error");
    assert_eq!(remote.message, "user not found");
    assert_eq!(remote.errors[0].path, Some(vec!["user".into()]));
}

#[tokio::test]
async fn mutation_round_trip() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::MsgPack).await;
    let data: RenameData = client(&bus, Codec::MsgPack)
        .execute(&CallContext::new(), &RENAME, &RenameVars {
            id: "3".into(),
            name: "ada".into(),
        })
        .await
        .unwrap();
    assert_eq!(data.rename.name, "ada");
}

#[tokio::test]
async fn credentials_reach_resolvers() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;

    let anonymous: WhoAmIData = client(&bus, Codec::Json)
        .execute(&CallContext::new(), &WHO_AM_I, &json!({}))
        .await
        .unwrap();
    assert_eq!(anonymous.whoami, None);

    let svc = RemoteService::new(
        "users",
        Arc::new(bus.clone()) as Arc<dyn Transport>,
        ClientOptions::default().with_credentials("token-123"),
    );
    let named: WhoAmIData = svc
        .execute(&CallContext::new(), &WHO_AM_I, &json!({}))
        .await
        .unwrap();
    assert_eq!(named.whoami.as_deref(), Some("token-123"));
}

#[tokio::test]
async fn catalogue_returns_schema_sdl() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;
    let reply = bus
        .request("users/__catalogue", Bytes::new(), Duration::from_secs(1))
        .await
        .unwrap();
    let env: ResponseEnvelope = Codec::Json.decode(&reply).unwrap();
    let sdl = env.data["sdl"].as_str().unwrap();
    assert!(sdl.contains("type UserObject"));
    assert!(sdl.contains("countdown(from: Int!): Int!"));
}

#[tokio::test]
async fn mismatched_operation_name_is_rejected() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;
    let req = WireRequest::new(OperationKind::Query, "WhoAmI", WHO_AM_I.document, json!({}));
    let reply = bus
        .request("users/GetUser", Codec::Json.encode(&req).unwrap(), Duration::from_secs(1))
        .await
        .unwrap();
    let env: ResponseEnvelope = Codec::Json.decode(&reply).unwrap();
    assert_eq!(env.errors[0].code(), Some(error_codes::UNKNOWN_OPERATION));
}

#[tokio::test]
async fn undecodable_request_gets_bad_request() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;
    let reply = bus
        .request("users/GetUser", Bytes::from_static(b"not json"), Duration::from_secs(1))
        .await
        .unwrap();
    let env: ResponseEnvelope = Codec::Json.decode(&reply).unwrap();
    assert_eq!(env.errors[0].code(), Some(error_codes::BAD_REQUEST));
    assert!(env.data.is_null());
}

// ── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn finite_subscription_ends_after_last_item() {
    for codec in Codec::ALL {
        let bus = MemoryBus::new();
        let (_shutdown, _server) = start(&bus, codec).await;
        let stream = client(&bus, codec)
            .subscribe::<_, CountdownData>(&CallContext::new(), &COUNTDOWN, &FromVars { from: 2 })
            .await
            .unwrap();
        let values: Vec<i32> = timeout(Duration::from_secs(2), stream.collect::<Vec<_>>())
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.unwrap().countdown)
            .collect();
        assert_eq!(values, vec![2, 1, 0]);
    }
}

#[tokio::test]
async fn cancelling_subscription_stops_the_server_stream() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;
    let mut stream = client(&bus, Codec::Json)
        .subscribe::<_, TicksData>(&CallContext::new(), &TICKS, &json!({}))
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!((first.ticks, second.ticks), (0, 1));

    let cancel_subject = format!("{}/cancel", stream.subject());
    wait_for(|| bus.interest(&cancel_subject) > 0).await;
    stream.cancel();
    assert!(stream.next().await.is_none());

    // The server drops its cancel watch once it stops streaming.
    wait_for(|| bus.interest(&cancel_subject) == 0).await;
}

#[tokio::test]
async fn cancelling_before_the_server_watches_still_stops_the_stream() {
    let bus = MemoryBus::new();
    let (_shutdown, _server) = start(&bus, Codec::Json).await;
    let baseline = bus.subscriber_count();

    let mut stream = client(&bus, Codec::Json)
        .subscribe::<_, TicksData>(&CallContext::new(), &TICKS, &json!({}))
        .await
        .unwrap();
    let cancel_subject = format!("{}/cancel", stream.subject());
    stream.cancel();
    drop(stream);

    // Give the server time to pick the request up and start streaming into
    // the abandoned inbox.
    tokio::time::sleep(Duration::from_millis(100)).await;
    wait_for(|| bus.interest(&cancel_subject) == 0 && bus.subscriber_count() == baseline).await;
}

#[tokio::test]
async fn server_shutdown_ends_open_streams() {
    let bus = MemoryBus::new();
    let (shutdown, server) = start(&bus, Codec::Json).await;
    let mut stream = client(&bus, Codec::Json)
        .subscribe::<_, TicksData>(&CallContext::new(), &TICKS, &json!({}))
        .await
        .unwrap();
    assert!(stream.next().await.unwrap().is_ok());

    shutdown.cancel();
    timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
    let rest = timeout(Duration::from_secs(2), async {
        let mut n = 0;
        while stream.next().await.is_some() {
            n += 1;
        }
        n
    })
    .await
    .expect("stream should end after shutdown");
    assert!(rest < 100);
    assert_eq!(bus.interest("users/GetUser"), 0);
}

#[tokio::test]
async fn subscription_without_subscription_root_reports_error() {
    let bus = MemoryBus::new();
    let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription).finish();
    let server = BusServer::new(
        "users",
        schema,
        Arc::new(bus.clone()) as Arc<dyn Transport>,
        ServerOptions::default(),
    );
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { server.serve(token).await.unwrap() });
    wait_for(|| bus.interest("users/Ticks") > 0).await;

    let mut stream = client(&bus, Codec::Json)
        .subscribe::<_, TicksData>(&CallContext::new(), &TICKS, &json!({}))
        .await
        .unwrap();
    let first = timeout(Duration::from_secs(2), stream.next()).await.unwrap();
    assert!(matches!(first, Some(Err(ClientError::Remote(_)))));
    shutdown.cancel();
}
