//! Message handlers: fee estimation, preparation, sending, history backfill.
//!
//! `sendMessage` resolves with the confirming transaction, which may take
//! until the message expires.

use async_trait::async_trait;
use ember_core::RpcError;
use ember_core::models::{KeyPassword, MessageToPrepare, SignedMessage, TransactionId};
use serde_json::{Value, json};
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::handlers::{parse_param, require_string_param, to_result};
use crate::rpc::registry::MethodHandler;

/// Estimate the fees of a transfer.
pub struct EstimateFeesHandler;

#[async_trait]
impl MethodHandler for EstimateFeesHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let message: MessageToPrepare = parse_param(params.as_ref(), "params")?;
        let fees = ctx
            .controller
            .accounts()
            .estimate_fees(&address, message)
            .await?;
        Ok(json!({ "fees": fees }))
    }
}

/// Estimate the fees of deploying the wallet contract.
pub struct EstimateDeploymentFeesHandler;

#[async_trait]
impl MethodHandler for EstimateDeploymentFeesHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let fees = ctx
            .controller
            .accounts()
            .estimate_deployment_fees(&address)
            .await?;
        Ok(json!({ "fees": fees }))
    }
}

/// Prepare and sign a transfer.
pub struct PrepareMessageHandler;

#[async_trait]
impl MethodHandler for PrepareMessageHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let message: MessageToPrepare = parse_param(params.as_ref(), "params")?;
        let password: KeyPassword = parse_param(params.as_ref(), "password")?;
        let signed = ctx
            .controller
            .accounts()
            .prepare_message(&address, message, password)
            .await?;
        to_result(&signed)
    }
}

/// Prepare and sign a deployment message.
pub struct PrepareDeploymentMessageHandler;

#[async_trait]
impl MethodHandler for PrepareDeploymentMessageHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let password: KeyPassword = parse_param(params.as_ref(), "password")?;
        let signed = ctx
            .controller
            .accounts()
            .prepare_deployment_message(&address, password)
            .await?;
        to_result(&signed)
    }
}

/// Submit a signed message and wait for its confirmation.
pub struct SendMessageHandler;

#[async_trait]
impl MethodHandler for SendMessageHandler {
    #[instrument(skip(self, ctx), fields(method = "sendMessage"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let message: SignedMessage = parse_param(params.as_ref(), "message")?;
        let transaction = ctx
            .controller
            .accounts()
            .send_message(&address, message)
            .await?;
        to_result(&transaction)
    }
}

/// Backfill history older than a known transaction.
pub struct PreloadTransactionsHandler;

#[async_trait]
impl MethodHandler for PreloadTransactionsHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let from: TransactionId = parse_param(params.as_ref(), "from")?;
        ctx.controller
            .accounts()
            .preload_transactions(&address, from)
            .await?;
        Ok(json!({ "requested": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::rpc::handlers::test_helpers::{address, harness, make_test_context, password};
    use ember_core::MessageId;
    use ember_core::errors::RpcErrorCode;
    use ember_engine::testing::{incoming_transaction, signed_message};

    fn transfer() -> Value {
        json!({ "recipient": "0:dest", "amount": 1_000 })
    }

    #[tokio::test(start_paused = true)]
    async fn estimate_fees_returns_engine_estimate() {
        let ctx = make_test_context().await;
        let result = EstimateFeesHandler
            .handle(Some(json!({ "address": address(), "params": transfer() })), &ctx)
            .await
            .unwrap();
        assert_eq!(result["fees"], 10_000_000);

        let result = EstimateDeploymentFeesHandler
            .handle(Some(json!({ "address": address() })), &ctx)
            .await
            .unwrap();
        assert_eq!(result["fees"], 10_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn estimate_fees_for_unknown_address() {
        let ctx = make_test_context().await;
        let err = EstimateFeesHandler
            .handle(Some(json!({ "address": "0:nobody", "params": transfer() })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::NoSubscription);
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_message_signs() {
        let ctx = make_test_context().await;
        let result = PrepareMessageHandler
            .handle(
                Some(json!({
                    "address": address(),
                    "params": transfer(),
                    "password": password(),
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result["bodyHash"].as_str().unwrap().ends_with("#sig-pk"));

        let result = PrepareDeploymentMessageHandler
            .handle(
                Some(json!({ "address": address(), "password": password() })),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result["bodyHash"].as_str().unwrap().ends_with("#sig-pk"));
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_message_requires_password() {
        let ctx = make_test_context().await;
        let err = PrepareMessageHandler
            .handle(Some(json!({ "address": address(), "params": transfer() })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::InvalidParams);
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_resolves_with_transaction() {
        let h = harness().await;
        let wallet = h.engine.wallet(&address());
        let ctx = h.ctx.clone();
        let send = tokio::spawn(async move {
            SendMessageHandler
                .handle(
                    Some(json!({ "address": address(), "message": signed_message("m1") })),
                    &ctx,
                )
                .await
        });

        while wallet.sent().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(wallet.confirm(&MessageId::from("m1"), incoming_transaction(30, "0:a", 5)));

        let result = send.await.unwrap().unwrap();
        assert_eq!(result["id"]["lt"], 30);
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_superseded_by_log_out() {
        let h = harness().await;
        let wallet = h.engine.wallet(&address());
        let ctx = h.ctx.clone();
        let send = tokio::spawn(async move {
            SendMessageHandler
                .handle(
                    Some(json!({ "address": address(), "message": signed_message("m1") })),
                    &ctx,
                )
                .await
        });

        while wallet.sent().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        h.ctx.controller.log_out().await.unwrap();

        let err = send.await.unwrap().unwrap_err();
        assert_eq!(err.code, RpcErrorCode::Superseded);
    }

    #[tokio::test(start_paused = true)]
    async fn preload_transactions_parses_anchor() {
        let ctx = make_test_context().await;
        let result = PreloadTransactionsHandler
            .handle(
                Some(json!({ "address": address(), "from": { "lt": 10, "hash": "tx10" } })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result["requested"], true);

        let err = PreloadTransactionsHandler
            .handle(Some(json!({ "address": address(), "from": 10 })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::InvalidParams);
    }
}
