use widevine_proxy::crypto;
use widevine_proxy::signer;

// Test provider credentials published for the Widevine UAT service.
const KEY: &str = "1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9";
const IV: &str = "d58ce954203b7c9a9a9d467f59839249";

fn main() -> anyhow::Result<()> {
    let payload = std::env::args()
        .nth(1)
        .unwrap_or_else(|| r#"{"payload":"CAQ="}"#.to_string());

    let key = hex::decode(KEY)?;
    let iv = hex::decode(IV)?;

    let envelope = signer::pack(payload.as_bytes(), &key, &iv, "widevine_test")?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    let digest = crypto::decrypt(&key, &iv, &envelope.signature_bytes()?)?;
    println!("sha1: {}", hex::encode(digest));

    Ok(())
}
