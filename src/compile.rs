//! Compile pipeline: parse, analyze, generate, print.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analyze::{analyze, Analysis};
use crate::codegen::generate_client;
use crate::emit::print_module;
use crate::error::CompilerError;
use crate::fragment::HydrationSlot;
use crate::parse::parse;
use crate::server::generate_server;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompileMode {
    #[default]
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub mode: CompileMode,
    /// Emit the hydration branch in client `create`.
    pub hydratable: bool,
    /// Used in diagnostics only.
    pub file_path: String,
    pub event_prefix: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            mode: CompileMode::Client,
            hydratable: true,
            file_path: "Component.svelte".to_string(),
            event_prefix: "on:".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn with_mode(&self, mode: CompileMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    pub mode: CompileMode,
    pub analysis: Analysis,
    /// SHA-256 of `code`, hex encoded.
    pub hash: String,
    pub hydration: Vec<HydrationSlot>,
}

/// Client and server modules for one component.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub client: CompileResult,
    pub server: CompileResult,
}

pub fn compute_hash(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compile one component into the module selected by `options.mode`.
pub fn compile(source: &str, options: &CompileOptions) -> Result<CompileResult, CompilerError> {
    let mut component = parse(source, &options.file_path)?;
    let analysis = analyze(&mut component, &options.event_prefix);

    let (module, hydration) = match options.mode {
        CompileMode::Client => {
            let out = generate_client(&component, &analysis, options);
            (out.module, out.hydration)
        }
        CompileMode::Server => {
            let out = generate_server(&component, &analysis, options);
            (out.module, out.hydration)
        }
    };
    let code = print_module(&module);
    log::debug!(
        "compiled {} ({:?}): {} bytes, {} hydration slots",
        options.file_path,
        options.mode,
        code.len(),
        hydration.len()
    );

    Ok(CompileResult {
        hash: compute_hash(&code),
        code,
        mode: options.mode,
        analysis,
        hydration,
    })
}

/// Compile the client and server modules side by side.
pub fn compile_targets(source: &str, options: &CompileOptions) -> Result<BuildOutput, CompilerError> {
    let client_options = options.with_mode(CompileMode::Client);
    let server_options = options.with_mode(CompileMode::Server);
    let (client, server) = rayon::join(
        || compile(source, &client_options),
        || compile(source, &server_options),
    );
    Ok(BuildOutput {
        client: client?,
        server: server?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: CompileOptions = serde_json::from_str(r#"{"mode":"server"}"#).unwrap();
        assert_eq!(options.mode, CompileMode::Server);
        assert!(options.hydratable);
        assert_eq!(options.event_prefix, "on:");
        assert_eq!(options.file_path, "Component.svelte");
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let hash = compute_hash("");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_compile_targets_match_single_compiles() {
        let source = "<script>let n = 1;</script><p>{n}</p>";
        let options = CompileOptions::default();
        let both = compile_targets(source, &options).unwrap();
        let server = compile(source, &options.with_mode(CompileMode::Server)).unwrap();
        assert_eq!(both.server.code, server.code);
        assert_eq!(both.client.mode, CompileMode::Client);
        assert_eq!(both.client.hydration, both.server.hydration);
    }
}
