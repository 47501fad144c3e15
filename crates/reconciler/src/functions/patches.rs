//! Copy-on-write deployment transforms and the matching read helpers.
//!
//! Every transform clones its input and edits the clone. Volumes, mounts and
//! env vars are keyed by name: an existing item with the same name is
//! replaced in place, otherwise the item is appended, so applying the same
//! transform twice yields the same deployment as applying it once.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, SecretVolumeSource, Volume, VolumeMount};

/// The pod spec of a deployment's template, if any.
pub fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment.spec.as_ref()?.template.spec.as_ref()
}

/// The container called `name`, if any.
pub fn container<'a>(deployment: &'a Deployment, name: &str) -> Option<&'a Container> {
    pod_spec(deployment)?
        .containers
        .iter()
        .find(|c| c.name == name)
}

/// The secret backing the volume called `volume_name`, if any.
pub fn volume_secret_name(deployment: &Deployment, volume_name: &str) -> Option<String> {
    pod_spec(deployment)?
        .volumes
        .as_ref()?
        .iter()
        .find(|v| v.name == volume_name)?
        .secret
        .as_ref()?
        .secret_name
        .clone()
}

fn pod_spec_mut(deployment: &mut Deployment) -> &mut PodSpec {
    deployment
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
}

fn upsert_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}

fn upsert_mount(mounts: &mut Vec<VolumeMount>, mount: VolumeMount) {
    match mounts.iter_mut().find(|m| m.name == mount.name) {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }
}

/// Add or replace a volume backed by `secret_name`.
pub fn secret_volume(
    volume_name: &str,
    secret_name: &str,
) -> impl Fn(&Deployment) -> Deployment + Send + Sync + 'static {
    let volume = Volume {
        name: volume_name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    };
    move |deployment: &Deployment| {
        let mut patched = deployment.clone();
        let volumes = pod_spec_mut(&mut patched)
            .volumes
            .get_or_insert_with(Vec::new);
        upsert_volume(volumes, volume.clone());
        patched
    }
}

/// Add or replace a read-only mount of `volume_name` in `container_name`.
pub fn read_only_mount(
    container_name: &str,
    volume_name: &str,
    mount_path: &str,
) -> impl Fn(&Deployment) -> Deployment + Send + Sync + 'static {
    let container_name = container_name.to_string();
    let mount = VolumeMount {
        name: volume_name.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(true),
        ..VolumeMount::default()
    };
    move |deployment: &Deployment| {
        let mut patched = deployment.clone();
        pod_spec_mut(&mut patched)
            .containers
            .iter_mut()
            .filter(|c| c.name == container_name)
            .for_each(|c| upsert_mount(c.volume_mounts.get_or_insert_with(Vec::new), mount.clone()));
        patched
    }
}

/// Replace the env of `container_name` with `env`.
pub fn container_env(
    container_name: &str,
    env: Vec<EnvVar>,
) -> impl Fn(&Deployment) -> Deployment + Send + Sync + 'static {
    let container_name = container_name.to_string();
    move |deployment: &Deployment| {
        let mut patched = deployment.clone();
        pod_spec_mut(&mut patched)
            .containers
            .iter_mut()
            .filter(|c| c.name == container_name)
            .for_each(|c| c.env = Some(env.clone()));
        patched
    }
}
