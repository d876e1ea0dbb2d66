//! Network and lifecycle handlers: state snapshot, presets, network switch,
//! log out, subscription start/stop.

use async_trait::async_trait;
use ember_core::RpcError;
use ember_core::models::NetworkConfig;
use serde_json::{Value, json};
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::handlers::{parse_param, to_result};
use crate::rpc::registry::MethodHandler;

/// Full controller state.
pub struct GetStateHandler;

#[async_trait]
impl MethodHandler for GetStateHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        to_result(&ctx.controller.state())
    }
}

/// Built-in network presets.
pub struct GetAvailableNetworksHandler;

#[async_trait]
impl MethodHandler for GetAvailableNetworksHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({ "networks": ctx.controller.available_networks() }))
    }
}

/// Switch the live network.
pub struct ChangeNetworkHandler;

#[async_trait]
impl MethodHandler for ChangeNetworkHandler {
    #[instrument(skip(self, ctx), fields(method = "changeNetwork"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let network: NetworkConfig = parse_param(params.as_ref(), "network")?;
        ctx.controller.change_network(network.clone()).await?;
        Ok(json!({ "selectedConnection": network }))
    }
}

/// Drop every account and key.
pub struct LogOutHandler;

#[async_trait]
impl MethodHandler for LogOutHandler {
    #[instrument(skip(self, ctx), fields(method = "logOut"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        ctx.controller.log_out().await?;
        Ok(json!({ "loggedOut": true }))
    }
}

/// Start a subscription for every stored account entry.
pub struct StartSubscriptionsHandler;

#[async_trait]
impl MethodHandler for StartSubscriptionsHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let accounts = ctx.controller.accounts();
        accounts.start_subscriptions().await?;
        Ok(json!({ "subscribed": accounts.subscribed_addresses() }))
    }
}

/// Stop every subscription.
pub struct StopSubscriptionsHandler;

#[async_trait]
impl MethodHandler for StopSubscriptionsHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        ctx.controller.accounts().stop_subscriptions().await;
        Ok(json!({ "stopped": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::handlers::test_helpers::{address, harness, make_test_context};
    use ember_core::errors::RpcErrorCode;
    use ember_core::models::{MAINNET, TESTNET, network_preset};

    #[tokio::test(start_paused = true)]
    async fn get_state_reports_network_and_accounts() {
        let ctx = make_test_context().await;
        let result = GetStateHandler.handle(None, &ctx).await.unwrap();
        assert_eq!(result["selectedConnection"]["name"], MAINNET);
        assert_eq!(result["selectedAccount"]["tonWallet"]["address"], address());
        assert!(result["accountContractStates"][address()].is_object());
    }

    #[tokio::test(start_paused = true)]
    async fn get_available_networks_lists_presets() {
        let ctx = make_test_context().await;
        let result = GetAvailableNetworksHandler.handle(None, &ctx).await.unwrap();
        let names: Vec<&str> = result["networks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec![MAINNET, TESTNET]);
    }

    #[tokio::test(start_paused = true)]
    async fn change_network_switches() {
        let ctx = make_test_context().await;
        let testnet = network_preset(TESTNET).unwrap();

        let result = ChangeNetworkHandler
            .handle(Some(json!({ "network": testnet })), &ctx)
            .await
            .unwrap();
        assert_eq!(result["selectedConnection"]["name"], TESTNET);
        assert_eq!(
            ctx.controller.state().selected_connection.map(|c| c.name),
            Some(TESTNET.to_owned())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn change_network_failure_is_connection_failed() {
        let h = harness().await;
        h.factory.fail(TESTNET);
        let testnet = network_preset(TESTNET).unwrap();

        let err = ChangeNetworkHandler
            .handle(Some(json!({ "network": testnet })), &h.ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::ConnectionFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn change_network_requires_network() {
        let ctx = make_test_context().await;
        let err = ChangeNetworkHandler
            .handle(Some(json!({})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::InvalidParams);
    }

    #[tokio::test(start_paused = true)]
    async fn log_out_clears_state() {
        let ctx = make_test_context().await;
        let result = LogOutHandler.handle(None, &ctx).await.unwrap();
        assert_eq!(result["loggedOut"], true);
        assert!(ctx.controller.accounts().state().selected_account.is_none());
        assert!(ctx.controller.accounts().subscribed_addresses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_start_subscriptions() {
        let ctx = make_test_context().await;

        let _ = StopSubscriptionsHandler.handle(None, &ctx).await.unwrap();
        assert!(ctx.controller.accounts().subscribed_addresses().is_empty());

        let result = StartSubscriptionsHandler.handle(None, &ctx).await.unwrap();
        assert_eq!(result["subscribed"], json!([address()]));
    }
}
