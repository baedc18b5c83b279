use kube::Client;

/// Build a client from an explicit kubeconfig path, falling back to
/// in-cluster config or the default kubeconfig.
pub async fn create_client(kubeconfig: Option<&str>) -> anyhow::Result<Client> {
    let client = if let Some(path) = kubeconfig {
        let kubeconfig = kube::config::Kubeconfig::read_from(path)?;
        let config = kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &kube::config::KubeConfigOptions::default(),
        )
        .await?;
        Client::try_from(config)?
    } else {
        Client::try_default().await?
    };
    Ok(client)
}
