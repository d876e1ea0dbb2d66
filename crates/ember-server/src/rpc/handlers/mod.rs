//! RPC handler modules and registration.

pub mod accounts;
pub mod messages;
pub mod network;

use serde::de::DeserializeOwned;
use serde_json::Value;

use ember_core::RpcError;

use crate::rpc::registry::MethodRegistry;

/// Register all RPC handlers with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // Network and lifecycle
    registry.register("getState", network::GetStateHandler);
    registry.register("getAvailableNetworks", network::GetAvailableNetworksHandler);
    registry.register("changeNetwork", network::ChangeNetworkHandler);
    registry.register("logOut", network::LogOutHandler);
    registry.register("startSubscriptions", network::StartSubscriptionsHandler);
    registry.register("stopSubscriptions", network::StopSubscriptionsHandler);

    // Accounts
    registry.register("checkPassword", accounts::CheckPasswordHandler);
    registry.register("createAccount", accounts::CreateAccountHandler);
    registry.register("selectAccount", accounts::SelectAccountHandler);
    registry.register("removeAccount", accounts::RemoveAccountHandler);

    // Messages
    registry.register("estimateFees", messages::EstimateFeesHandler);
    registry.register(
        "estimateDeploymentFees",
        messages::EstimateDeploymentFeesHandler,
    );
    registry.register("prepareMessage", messages::PrepareMessageHandler);
    registry.register(
        "prepareDeploymentMessage",
        messages::PrepareDeploymentMessageHandler,
    );
    registry.register("sendMessage", messages::SendMessageHandler);
    registry.register("preloadTransactions", messages::PreloadTransactionsHandler);
}

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(
    params: Option<&'a Value>,
    key: &str,
) -> Result<&'a Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::invalid_params(format!("Missing required parameter: {key}")))
}

/// Extract a required string parameter.
pub(crate) fn require_string_param(
    params: Option<&Value>,
    key: &str,
) -> Result<String, RpcError> {
    require_param(params, key)?
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| RpcError::invalid_params(format!("Parameter '{key}' must be a string")))
}

/// Extract a required parameter and deserialize it.
pub(crate) fn parse_param<T: DeserializeOwned>(
    params: Option<&Value>,
    key: &str,
) -> Result<T, RpcError> {
    let value = require_param(params, key)?;
    T::deserialize(value)
        .map_err(|e| RpcError::invalid_params(format!("Parameter '{key}' is invalid: {e}")))
}

/// Serialize a handler result.
pub(crate) fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}
