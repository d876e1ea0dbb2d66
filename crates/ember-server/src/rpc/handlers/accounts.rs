//! Account handlers: password check, create, select, remove.

use async_trait::async_trait;
use ember_core::RpcError;
use ember_core::models::{AccountToCreate, KeyPassword};
use serde_json::{Value, json};
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::handlers::{parse_param, require_string_param, to_result};
use crate::rpc::registry::MethodHandler;

/// Check a key password.
pub struct CheckPasswordHandler;

#[async_trait]
impl MethodHandler for CheckPasswordHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let password: KeyPassword = parse_param(params.as_ref(), "password")?;
        let valid = ctx.controller.accounts().check_password(&password).await?;
        Ok(json!({ "valid": valid }))
    }
}

/// Create an account from a seed and select it.
pub struct CreateAccountHandler;

#[async_trait]
impl MethodHandler for CreateAccountHandler {
    #[instrument(skip_all, fields(method = "createAccount"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let account: AccountToCreate = parse_param(params.as_ref(), "account")?;
        let created = ctx.controller.accounts().create_account(account).await?;
        to_result(&created)
    }
}

/// Make a stored account current.
pub struct SelectAccountHandler;

#[async_trait]
impl MethodHandler for SelectAccountHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        let selected = ctx.controller.accounts().select_account(&address).await?;
        to_result(&selected)
    }
}

/// Remove a stored account and stop its subscriptions.
pub struct RemoveAccountHandler;

#[async_trait]
impl MethodHandler for RemoveAccountHandler {
    #[instrument(skip(self, ctx), fields(method = "removeAccount"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let address = require_string_param(params.as_ref(), "address")?;
        ctx.controller.accounts().remove_account(&address).await?;
        Ok(json!({ "removed": address }))
    }
}
