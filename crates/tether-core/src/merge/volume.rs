//! Volumes and volume mounts on a pod template

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use std::collections::HashMap;

use super::{MergeError, MergeFunction, merge_keyed_opt, override_current};

/// Adds volumes to a pod template and mounts them into its containers
pub struct VolumeManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> VolumeManager<'a> {
    pub fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    fn spec(&mut self) -> &mut PodSpec {
        self.template.spec.get_or_insert_with(PodSpec::default)
    }

    /// Add the volume and mount it in every container
    pub fn add_volume(&mut self, volume: Volume, mount: VolumeMount) {
        // override never fails
        let _ = self.add_volume_with_merge(volume, mount, override_current, override_current);
    }

    /// Add the volume and mount it in the named container
    pub fn add_volume_to_container(&mut self, volume: Volume, mount: VolumeMount, container: &str) {
        let _ = self.add_volume_to_containers_with_merge(
            volume,
            mount,
            &[container],
            override_current,
            override_current,
        );
    }

    /// Add the volume and mount it in each named container
    pub fn add_volume_to_containers(
        &mut self,
        volume: Volume,
        mount: VolumeMount,
        containers: &[&str],
    ) {
        let _ = self.add_volume_to_containers_with_merge(
            volume,
            mount,
            containers,
            override_current,
            override_current,
        );
    }

    pub fn add_volume_with_merge(
        &mut self,
        volume: Volume,
        mount: VolumeMount,
        volume_merge: MergeFunction<Volume>,
        mount_merge: MergeFunction<VolumeMount>,
    ) -> Result<(), MergeError> {
        self.stage(volume, mount, None, volume_merge, mount_merge)
    }

    pub fn add_volume_to_containers_with_merge(
        &mut self,
        volume: Volume,
        mount: VolumeMount,
        containers: &[&str],
        volume_merge: MergeFunction<Volume>,
        mount_merge: MergeFunction<VolumeMount>,
    ) -> Result<(), MergeError> {
        self.stage(volume, mount, Some(containers), volume_merge, mount_merge)
    }

    /// Volume and mounts go to a copy of the spec, written back only when
    /// every merge succeeded
    fn stage(
        &mut self,
        volume: Volume,
        mount: VolumeMount,
        containers: Option<&[&str]>,
        volume_merge: MergeFunction<Volume>,
        mount_merge: MergeFunction<VolumeMount>,
    ) -> Result<(), MergeError> {
        let spec = self.spec();
        let mut staged = spec.clone();
        add_volume_to_pod(&mut staged, volume, volume_merge)?;
        for container in staged
            .containers
            .iter_mut()
            .filter(|c| containers.is_none_or(|names| names.contains(&c.name.as_str())))
        {
            add_volume_mount_to_container(container, mount.clone(), mount_merge)?;
        }
        *spec = staged;
        Ok(())
    }
}

/// Add a volume to a pod spec, keyed by volume name
pub fn add_volume_to_pod(
    spec: &mut PodSpec,
    volume: Volume,
    merge: MergeFunction<Volume>,
) -> Result<(), MergeError> {
    merge_keyed_opt(&mut spec.volumes, volume, |v| v.name.clone(), merge)
}

/// Add a volume mount to a container, keyed by mount name and path
pub fn add_volume_mount_to_container(
    container: &mut Container,
    mount: VolumeMount,
    merge: MergeFunction<VolumeMount>,
) -> Result<(), MergeError> {
    merge_keyed_opt(
        &mut container.volume_mounts,
        mount,
        |m| (m.name.clone(), m.mount_path.clone()),
        merge,
    )
}

/// Combine the item projections of two volumes backed by the same config map
///
/// Volumes bound to different config maps resolve to the new one.
pub fn merge_config_map_items(current: &Volume, new: &Volume) -> Result<Volume, MergeError> {
    let (Some(current_cm), Some(new_cm)) = (&current.config_map, &new.config_map) else {
        return Ok(new.clone());
    };
    if current_cm.name != new_cm.name {
        return Ok(new.clone());
    }

    let mut merged = current.clone();
    merged.config_map = Some(merge_config_map_source(current_cm, new_cm)?);
    Ok(merged)
}

fn merge_config_map_source(
    current: &ConfigMapVolumeSource,
    new: &ConfigMapVolumeSource,
) -> Result<ConfigMapVolumeSource, MergeError> {
    let mut merged = current.clone();
    let items = merged.items.get_or_insert_with(Vec::new);

    let mut key_by_path: HashMap<String, String> = HashMap::new();
    let mut path_by_key: HashMap<String, String> = HashMap::new();
    for item in items.iter() {
        key_by_path.insert(item.path.clone(), item.key.clone());
        path_by_key.insert(item.key.clone(), item.path.clone());
    }

    for item in new.items.iter().flatten() {
        if let Some(key) = key_by_path.get(&item.path) {
            if *key != item.key {
                return Err(MergeError::conflict(format!(
                    "path {} already used by key {}",
                    item.path, key
                )));
            }
            for existing in items.iter_mut().filter(|i| i.key == item.key) {
                existing.mode = larger_mode(existing.mode, item.mode);
            }
            continue;
        }
        if let Some(path) = path_by_key.get(&item.key) {
            return Err(MergeError::conflict(format!(
                "key {} already mapped to path {}",
                item.key, path
            )));
        }

        key_by_path.insert(item.path.clone(), item.key.clone());
        path_by_key.insert(item.key.clone(), item.path.clone());
        items.push(item.clone());
    }

    Ok(merged)
}

fn larger_mode(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{error_on_merge_attempt, ignore_new};
    use k8s_openapi::api::core::v1::KeyToPath;

    fn cm_volume(name: &str, cm: &str, items: &[(&str, &str, Option<i32>)]) -> Volume {
        Volume {
            name: name.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.to_string(),
                items: Some(
                    items
                        .iter()
                        .map(|(key, path, mode)| KeyToPath {
                            key: key.to_string(),
                            path: path.to_string(),
                            mode: *mode,
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn mount(name: &str, path: &str) -> VolumeMount {
        VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        }
    }

    fn template(containers: &[&str]) -> PodTemplateSpec {
        PodTemplateSpec {
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|name| Container {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn items(volume: &Volume) -> Vec<(String, String, Option<i32>)> {
        volume
            .config_map
            .as_ref()
            .and_then(|cm| cm.items.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|i| (i.key, i.path, i.mode))
            .collect()
    }

    #[test]
    fn test_add_volume_mounts_everywhere() {
        let mut tmpl = template(&["agent", "trace"]);
        let mut manager = VolumeManager::new(&mut tmpl);
        manager.add_volume(cm_volume("conf", "cm", &[]), mount("conf", "/etc/conf"));
        manager.add_volume(cm_volume("conf", "cm", &[]), mount("conf", "/etc/conf"));

        let spec = tmpl.spec.unwrap();
        assert_eq!(spec.volumes.unwrap().len(), 1);
        for container in spec.containers {
            assert_eq!(container.volume_mounts.unwrap().len(), 1);
        }
    }

    #[test]
    fn test_add_volume_to_named_container() {
        let mut tmpl = template(&["agent", "trace"]);
        VolumeManager::new(&mut tmpl).add_volume_to_container(
            cm_volume("conf", "cm", &[]),
            mount("conf", "/etc/conf"),
            "trace",
        );

        let spec = tmpl.spec.unwrap();
        assert!(spec.containers[0].volume_mounts.is_none());
        assert_eq!(spec.containers[1].volume_mounts.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_volume_policies() {
        let mut spec = PodSpec::default();
        add_volume_to_pod(&mut spec, cm_volume("v", "first", &[]), override_current).unwrap();
        add_volume_to_pod(&mut spec, cm_volume("v", "second", &[]), ignore_new).unwrap();
        let err = add_volume_to_pod(&mut spec, cm_volume("v", "third", &[]), error_on_merge_attempt);
        assert!(err.unwrap_err().is_merge_attempted());

        let volumes = spec.volumes.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].config_map.as_ref().unwrap().name, "first");
    }

    #[test]
    fn test_mount_conflict_leaves_template_untouched() {
        let mut tmpl = template(&["agent", "trace"]);
        let mut manager = VolumeManager::new(&mut tmpl);
        manager.add_volume_to_container(
            cm_volume("logs", "cm", &[]),
            VolumeMount {
                read_only: Some(true),
                ..mount("conf", "/etc/conf")
            },
            "trace",
        );

        let err = manager
            .add_volume_with_merge(
                cm_volume("conf", "cm", &[]),
                mount("conf", "/etc/conf"),
                override_current,
                error_on_merge_attempt,
            )
            .unwrap_err();
        assert!(err.is_merge_attempted());

        let spec = tmpl.spec.unwrap();
        let volumes: Vec<_> = spec.volumes.unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(volumes, vec!["logs".to_string()]);
        assert!(spec.containers[0].volume_mounts.is_none());
        assert_eq!(spec.containers[1].volume_mounts.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_config_map_items_combines() {
        let a = cm_volume("v", "cm", &[("a", "a.yaml", None)]);
        let b = cm_volume("v", "cm", &[("b", "b.yaml", None)]);
        let merged = merge_config_map_items(&a, &b).unwrap();
        assert_eq!(
            items(&merged),
            vec![
                ("a".to_string(), "a.yaml".to_string(), None),
                ("b".to_string(), "b.yaml".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_merge_config_map_items_larger_mode_wins() {
        let a = cm_volume("v", "cm", &[("a", "a.yaml", Some(0o444))]);
        let b = cm_volume("v", "cm", &[("a", "a.yaml", Some(0o755))]);
        let merged = merge_config_map_items(&a, &b).unwrap();
        assert_eq!(items(&merged), vec![("a".to_string(), "a.yaml".to_string(), Some(0o755))]);

        let merged = merge_config_map_items(&b, &a).unwrap();
        assert_eq!(items(&merged)[0].2, Some(0o755));
    }

    #[test]
    fn test_merge_config_map_items_conflicts() {
        let a = cm_volume("v", "cm", &[("a", "conf.yaml", None)]);
        let same_path = cm_volume("v", "cm", &[("b", "conf.yaml", None)]);
        let same_key = cm_volume("v", "cm", &[("a", "other.yaml", None)]);

        assert!(matches!(
            merge_config_map_items(&a, &same_path),
            Err(MergeError::Conflict { .. })
        ));
        assert!(matches!(
            merge_config_map_items(&a, &same_key),
            Err(MergeError::Conflict { .. })
        ));
    }

    #[test]
    fn test_merge_config_map_items_different_source() {
        let a = cm_volume("v", "cm-a", &[("a", "a.yaml", None)]);
        let b = cm_volume("v", "cm-b", &[("b", "b.yaml", None)]);
        assert_eq!(merge_config_map_items(&a, &b).unwrap(), b);
    }
}
