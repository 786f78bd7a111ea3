// ProxyConf Helper 入口

fn main() -> anyhow::Result<()> {
    proxyconf_helper::cli()
}
