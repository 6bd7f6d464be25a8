//! Scripted POSIX `sh` peers for tests.

use std::collections::HashMap;

use super::types::ServerLaunch;

/// A minimal MCP server in shell.
///
/// Tools and resources come from `FAKE_TOOLS_JSON` / `FAKE_RESOURCES_JSON`,
/// so they reach the child through the merged environment. `tools/call`
/// answers `ok`, except `fail_tool` (JSON-RPC error), `soft_error`
/// (`isError: true` result), `hang` (never
/// answered) and `exit_now` (the process exits without replying).
const FAKE_PEER_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9][0-9]*\),.*$/\1/p')
  if [ -z "$id" ]; then continue; fi
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{},"resources":{}},"serverInfo":{"name":"%s","version":"0.1.0"}}}\n' "$id" "$FAKE_NAME" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":%s}}\n' "$id" "$FAKE_TOOLS_JSON" ;;
    *'"method":"resources/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"resources":%s}}\n' "$id" "$FAKE_RESOURCES_JSON" ;;
    *'"name":"exit_now"'*)
      exit 1 ;;
    *'"name":"hang"'*)
      : ;;
    *'"name":"soft_error"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"bad input"}],"isError":true}}\n' "$id" ;;
    *'"name":"fail_tool"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"tool failed"}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"ok"}]}}\n' "$id" ;;
    *'"method":"resources/read"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"contents":[{"uri":"greeting://world","text":"Hello, world!"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"#;

/// Launch the scripted peer advertising `tools` and one `greeting://world` resource.
pub(crate) fn fake_peer(name: &str, tools: &[&str]) -> ServerLaunch {
    let tools_json: Vec<serde_json::Value> = tools
        .iter()
        .map(|tool| {
            serde_json::json!({
                "name": tool,
                "description": format!("{tool} tool"),
                "inputSchema": { "type": "object" },
            })
        })
        .collect();
    let resources_json = serde_json::json!([
        { "uri": "greeting://world", "name": "Greeting Resource" }
    ]);

    let mut env = HashMap::new();
    env.insert("FAKE_NAME".to_string(), name.to_string());
    env.insert(
        "FAKE_TOOLS_JSON".to_string(),
        serde_json::Value::Array(tools_json).to_string(),
    );
    env.insert("FAKE_RESOURCES_JSON".to_string(), resources_json.to_string());

    ServerLaunch {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), FAKE_PEER_SCRIPT.to_string()],
        environment_variables: env,
    }
}

/// Launch an arbitrary one-off shell script as the peer.
pub(crate) fn sh_peer(script: &str) -> ServerLaunch {
    ServerLaunch {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        environment_variables: HashMap::new(),
    }
}
