//! Shell snippets pointing an environment at the local inbounds. Printed,
//! never written into profiles; the user decides where to eval them.

use vn_core::types::ListenPorts;

pub fn render_proxy_on(ports: ListenPorts) -> String {
    format!(
        "export http_proxy=\"http://127.0.0.1:{http}\"\n\
         export https_proxy=\"http://127.0.0.1:{http}\"\n\
         export all_proxy=\"socks5://127.0.0.1:{socks}\"\n\
         export no_proxy=\"localhost,127.0.0.1,::1\"\n",
        http = ports.http,
        socks = ports.socks,
    )
}

pub fn render_proxy_off() -> String {
    "unset http_proxy https_proxy all_proxy no_proxy\n".to_string()
}
