//! Execution seam between the bus server and a GraphQL engine.

use {
    async_graphql::{ObjectType, Request, Schema, SubscriptionType, Variables},
    async_trait::async_trait,
    futures::{StreamExt, stream::BoxStream},
    gqlbus_protocol::{ResponseEnvelope, WireRequest},
};

use crate::{
    context::{BusRequestInfo, Credentials},
    error::envelope_from_response,
};

/// Something that can answer GraphQL operations received from the bus.
///
/// Implemented for every `async_graphql::Schema`; tests and adapters for other
/// engines can implement it directly.
#[async_trait]
pub trait OperationExecutor: Send + Sync + 'static {
    /// Schema definition language served on the catalogue subject.
    fn sdl(&self) -> String;

    /// Run a query or mutation to completion.
    async fn execute(&self, request: WireRequest, info: BusRequestInfo) -> ResponseEnvelope;

    /// Run a subscription. Each item is one result envelope.
    fn execute_stream(
        &self,
        request: WireRequest,
        info: BusRequestInfo,
    ) -> BoxStream<'static, ResponseEnvelope>;
}

fn graphql_request(request: WireRequest, info: BusRequestInfo) -> Request {
    let mut req = Request::new(request.query)
        .operation_name(request.operation_name)
        .variables(Variables::from_json(request.variables))
        .data(info);
    if let Some(credentials) = request.credentials {
        req = req.data(Credentials(credentials));
    }
    req
}

#[async_trait]
impl<Q, M, S> OperationExecutor for Schema<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    fn sdl(&self) -> String {
        Schema::sdl(self)
    }

    async fn execute(&self, request: WireRequest, info: BusRequestInfo) -> ResponseEnvelope {
        let response = Schema::execute(self, graphql_request(request, info)).await;
        envelope_from_response(response)
    }

    fn execute_stream(
        &self,
        request: WireRequest,
        info: BusRequestInfo,
    ) -> BoxStream<'static, ResponseEnvelope> {
        let schema = self.clone();
        let req = graphql_request(request, info);
        async_stream::stream! {
            let mut responses = Schema::execute_stream(&schema, req);
            while let Some(response) = responses.next().await {
                yield envelope_from_response(response);
            }
        }
        .boxed()
    }
}
