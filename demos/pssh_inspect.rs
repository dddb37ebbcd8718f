use widevine_proxy::pssh::PsshSummary;

fn main() -> anyhow::Result<()> {
    let input = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Usage: pssh_inspect <pssh_base64>"))?;

    let pssh = PsshSummary::from_base64(&input)?;
    println!("size: {} ({})", pssh.size_hex, pssh.size);
    println!("version: {}", pssh.version);
    println!("flags: {}", pssh.flags);
    println!("system_id: {}", pssh.system_id);
    println!("data: {}", pssh.data_hex);

    if pssh.key_ids.is_empty() {
        println!("key_ids: <none>");
    } else {
        for kid in pssh.key_id_uuids() {
            println!("kid: {}", kid);
        }
    }

    Ok(())
}
