use schemars::schema_for;
use switchboard_config::GatewayConfig;

pub fn main() {
  let output = std::env::args()
    .nth(1)
    .unwrap_or_else(|| "libs/config/switchboard.schema.json".to_string());

  println!("⚙️ Generating JSON schema for the gateway config file...");
  let schema = schema_for!(GatewayConfig);
  let as_string = serde_json::to_string_pretty(&schema).expect("failed to serialize schema");
  println!("✏️ Writing to: {}", output);
  std::fs::write(&output, as_string).expect("failed to write schema file");
  println!("✅ Done");
}
