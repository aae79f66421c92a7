//! # Payload Builder
//!
//! Validates call parts and assembles them into the VM's call formats.
//!
//! Structural checks run first, in a fixed order, and fail with
//! `InvalidRequest` before any VM or store access:
//! 1. module name non-empty and within the limit
//! 2. function name non-empty and within the limit
//! 3. type-argument count within the limit
//! 4. bytecode size within the limit (scripts and publishes)
//!
//! Type arguments are parsed last; a parse failure is `MalformedType`.

use crate::domain::entities::{EntryFunction, Script, UpgradePolicy, ViewFunction, VmConfig};
use crate::domain::type_tag::TypeTag;
use crate::domain::value_objects::{AccountAddress, Identifier, ModuleId};
use crate::errors::BridgeError;

/// Module holding the publish entry point.
pub const CODE_MODULE: &str = "code";
/// Publish entry point: `0x1::code::publish(vector<vector<u8>>, u8)`.
pub const PUBLISH_FUNCTION: &str = "publish";

/// Builds VM payloads under the configured limits.
#[derive(Clone, Debug, Default)]
pub struct PayloadBuilder {
    config: VmConfig,
}

impl PayloadBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: VmConfig) -> Self {
        Self { config }
    }

    /// Limits in force.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Builds an entry-function call.
    pub fn build_entry_function(
        &self,
        module_address: AccountAddress,
        module_name: &str,
        function_name: &str,
        type_args: &[String],
        args: Vec<Vec<u8>>,
    ) -> Result<EntryFunction, BridgeError> {
        let (module, function) = self.check_call(module_address, module_name, function_name)?;
        self.check_type_arg_count(type_args)?;
        Ok(EntryFunction {
            module,
            function,
            ty_args: parse_type_args(type_args)?,
            args,
        })
    }

    /// Builds a view-function call.
    pub fn build_view_function(
        &self,
        module_address: AccountAddress,
        module_name: &str,
        function_name: &str,
        type_args: &[String],
        args: Vec<Vec<u8>>,
    ) -> Result<ViewFunction, BridgeError> {
        let (module, function) = self.check_call(module_address, module_name, function_name)?;
        self.check_type_arg_count(type_args)?;
        Ok(ViewFunction {
            module,
            function,
            ty_args: parse_type_args(type_args)?,
            args,
        })
    }

    /// Builds a script call.
    pub fn build_script(
        &self,
        code: Vec<u8>,
        type_args: &[String],
        args: Vec<Vec<u8>>,
    ) -> Result<Script, BridgeError> {
        self.check_type_arg_count(type_args)?;
        if code.is_empty() {
            return Err(BridgeError::InvalidRequest("empty script".into()));
        }
        if code.len() > self.config.max_script_size {
            return Err(BridgeError::InvalidRequest(format!(
                "script size {} exceeds limit {}",
                code.len(),
                self.config.max_script_size
            )));
        }
        Ok(Script {
            code,
            ty_args: parse_type_args(type_args)?,
            args,
        })
    }

    /// Builds the `0x1::code::publish` call for a module bundle.
    pub fn build_publish(
        &self,
        modules: &[Vec<u8>],
        upgrade_policy: UpgradePolicy,
    ) -> Result<EntryFunction, BridgeError> {
        if modules.is_empty() {
            return Err(BridgeError::InvalidRequest("empty module bundle".into()));
        }
        for (idx, module) in modules.iter().enumerate() {
            if module.len() > self.config.max_module_size {
                return Err(BridgeError::InvalidRequest(format!(
                    "module #{idx} size {} exceeds limit {}",
                    module.len(),
                    self.config.max_module_size
                )));
            }
        }
        let (module, function) = self.check_call(AccountAddress::ONE, CODE_MODULE, PUBLISH_FUNCTION)?;
        Ok(EntryFunction {
            module,
            function,
            ty_args: Vec::new(),
            args: vec![bcs::to_bytes(modules)?, bcs::to_bytes(&upgrade_policy.as_u8())?],
        })
    }

    fn check_call(
        &self,
        module_address: AccountAddress,
        module_name: &str,
        function_name: &str,
    ) -> Result<(ModuleId, Identifier), BridgeError> {
        let module = check_name("module", module_name, self.config.max_module_name_length)?;
        let function = check_name("function", function_name, self.config.max_function_name_length)?;
        Ok((ModuleId::new(module_address, module), function))
    }

    fn check_type_arg_count(&self, type_args: &[String]) -> Result<(), BridgeError> {
        if type_args.len() > self.config.max_type_args {
            return Err(BridgeError::InvalidRequest(format!(
                "{} type arguments exceed limit {}",
                type_args.len(),
                self.config.max_type_args
            )));
        }
        Ok(())
    }
}

fn check_name(what: &str, name: &str, max_len: usize) -> Result<Identifier, BridgeError> {
    if name.is_empty() {
        return Err(BridgeError::InvalidRequest(format!("empty {what} name")));
    }
    if name.len() > max_len {
        return Err(BridgeError::InvalidRequest(format!(
            "{what} name length {} exceeds limit {max_len}",
            name.len()
        )));
    }
    Identifier::new(name)
        .ok_or_else(|| BridgeError::InvalidRequest(format!("invalid {what} name: {name}")))
}

fn parse_type_args(type_args: &[String]) -> Result<Vec<TypeTag>, BridgeError> {
    type_args
        .iter()
        .map(|arg| TypeTag::parse(arg).map_err(BridgeError::from))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
