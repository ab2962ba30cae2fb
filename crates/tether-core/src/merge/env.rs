//! Environment variables and env-from sources on a pod template

use k8s_openapi::api::core::v1::{Container, EnvFromSource, EnvVar, PodSpec, PodTemplateSpec};

use super::{MergeError, MergeFunction, merge_keyed_opt, override_current};

fn spec_of(template: &mut PodTemplateSpec) -> &mut PodSpec {
    template.spec.get_or_insert_with(PodSpec::default)
}

/// Which containers of the template a fragment targets
enum Target<'n> {
    All,
    Named(&'n [&'n str]),
    Init(&'n str),
}

/// Apply `apply` to every targeted container
///
/// Containers are changed on a copy of the spec that replaces the original
/// only when every container accepted the fragment.
fn for_each_target<F>(spec: &mut PodSpec, target: Target<'_>, apply: F) -> Result<(), MergeError>
where
    F: FnMut(&mut Container) -> Result<(), MergeError>,
{
    let mut staged = spec.clone();
    match target {
        Target::All => staged.containers.iter_mut().try_for_each(apply),
        Target::Named(names) => staged
            .containers
            .iter_mut()
            .filter(|c| names.contains(&c.name.as_str()))
            .try_for_each(apply),
        Target::Init(name) => staged
            .init_containers
            .iter_mut()
            .flatten()
            .filter(|c| c.name == name)
            .try_for_each(apply),
    }?;
    *spec = staged;
    Ok(())
}

/// Adds environment variables to containers, keyed by variable name
pub struct EnvVarManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> EnvVarManager<'a> {
    pub fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add the variable to every container
    pub fn add_env_var(&mut self, env: EnvVar) {
        let _ = self.add_env_var_with_merge(env, override_current);
    }

    pub fn add_env_var_to_container(&mut self, container: &str, env: EnvVar) {
        let _ = self.add_env_var_to_containers_with_merge(&[container], env, override_current);
    }

    pub fn add_env_var_to_containers(&mut self, containers: &[&str], env: EnvVar) {
        let _ = self.add_env_var_to_containers_with_merge(containers, env, override_current);
    }

    pub fn add_env_var_to_init_container(&mut self, container: &str, env: EnvVar) {
        let _ = self.add_env_var_to_init_container_with_merge(container, env, override_current);
    }

    pub fn add_env_var_with_merge(
        &mut self,
        env: EnvVar,
        merge: MergeFunction<EnvVar>,
    ) -> Result<(), MergeError> {
        for_each_target(spec_of(self.template), Target::All, |c| {
            add_env_var_to_container(c, env.clone(), merge)
        })
    }

    pub fn add_env_var_to_containers_with_merge(
        &mut self,
        containers: &[&str],
        env: EnvVar,
        merge: MergeFunction<EnvVar>,
    ) -> Result<(), MergeError> {
        for_each_target(spec_of(self.template), Target::Named(containers), |c| {
            add_env_var_to_container(c, env.clone(), merge)
        })
    }

    pub fn add_env_var_to_init_container_with_merge(
        &mut self,
        container: &str,
        env: EnvVar,
        merge: MergeFunction<EnvVar>,
    ) -> Result<(), MergeError> {
        for_each_target(spec_of(self.template), Target::Init(container), |c| {
            add_env_var_to_container(c, env.clone(), merge)
        })
    }
}

/// Add an environment variable to a single container
pub fn add_env_var_to_container(
    container: &mut Container,
    env: EnvVar,
    merge: MergeFunction<EnvVar>,
) -> Result<(), MergeError> {
    merge_keyed_opt(&mut container.env, env, |e| e.name.clone(), merge)
}

/// Identity of an env-from source
///
/// A config map and a secret sharing a name are distinct sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvFromKey {
    ConfigMap(String),
    Secret(String),
}

impl EnvFromKey {
    /// `None` for a source referencing neither a config map nor a secret
    pub fn of(source: &EnvFromSource) -> Option<Self> {
        if let Some(cm) = &source.config_map_ref {
            return Some(EnvFromKey::ConfigMap(cm.name.clone()));
        }
        source
            .secret_ref
            .as_ref()
            .map(|secret| EnvFromKey::Secret(secret.name.clone()))
    }
}

/// Adds env-from sources to containers, keyed by the referenced object
pub struct EnvFromManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> EnvFromManager<'a> {
    pub fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    pub fn add_env_from(&mut self, source: EnvFromSource) {
        let _ = self.add_env_from_with_merge(source, override_current);
    }

    pub fn add_env_from_to_container(&mut self, container: &str, source: EnvFromSource) {
        let _ = self.add_env_from_to_containers_with_merge(&[container], source, override_current);
    }

    pub fn add_env_from_to_init_container(&mut self, container: &str, source: EnvFromSource) {
        let _ = for_each_target(spec_of(self.template), Target::Init(container), |c| {
            add_env_from_to_container(c, source.clone(), override_current)
        });
    }

    pub fn add_env_from_with_merge(
        &mut self,
        source: EnvFromSource,
        merge: MergeFunction<EnvFromSource>,
    ) -> Result<(), MergeError> {
        for_each_target(spec_of(self.template), Target::All, |c| {
            add_env_from_to_container(c, source.clone(), merge)
        })
    }

    pub fn add_env_from_to_containers_with_merge(
        &mut self,
        containers: &[&str],
        source: EnvFromSource,
        merge: MergeFunction<EnvFromSource>,
    ) -> Result<(), MergeError> {
        for_each_target(spec_of(self.template), Target::Named(containers), |c| {
            add_env_from_to_container(c, source.clone(), merge)
        })
    }
}

/// Add an env-from source to a single container
///
/// Sources without a reference never match another source and are appended.
pub fn add_env_from_to_container(
    container: &mut Container,
    source: EnvFromSource,
    merge: MergeFunction<EnvFromSource>,
) -> Result<(), MergeError> {
    if EnvFromKey::of(&source).is_none() {
        container.env_from.get_or_insert_with(Vec::new).push(source);
        return Ok(());
    }
    merge_keyed_opt(&mut container.env_from, source, EnvFromKey::of, merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{error_on_merge_attempt, ignore_new};
    use k8s_openapi::api::core::v1::{ConfigMapEnvSource, SecretEnvSource};

    fn var(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    fn template() -> PodTemplateSpec {
        let container = |name: &str| Container {
            name: name.to_string(),
            ..Default::default()
        };
        PodTemplateSpec {
            spec: Some(PodSpec {
                containers: vec![container("agent"), container("trace")],
                init_containers: Some(vec![container("init")]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn env_of(tmpl: &PodTemplateSpec, idx: usize) -> Vec<(String, Option<String>)> {
        tmpl.spec.as_ref().unwrap().containers[idx]
            .env
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|e| (e.name, e.value))
            .collect()
    }

    #[test]
    fn test_env_var_policies() {
        let mut tmpl = template();
        let mut manager = EnvVarManager::new(&mut tmpl);
        manager.add_env_var(var("A", "1"));
        manager.add_env_var_with_merge(var("A", "2"), ignore_new).unwrap();
        let err = manager
            .add_env_var_with_merge(var("A", "3"), error_on_merge_attempt)
            .unwrap_err();
        assert!(err.is_merge_attempted());

        assert_eq!(env_of(&tmpl, 0), vec![("A".to_string(), Some("1".to_string()))]);
        assert_eq!(env_of(&tmpl, 1), vec![("A".to_string(), Some("1".to_string()))]);
    }

    #[test]
    fn test_env_var_override_default() {
        let mut tmpl = template();
        let mut manager = EnvVarManager::new(&mut tmpl);
        manager.add_env_var_to_container("trace", var("A", "1"));
        manager.add_env_var_to_container("trace", var("A", "2"));

        assert!(env_of(&tmpl, 0).is_empty());
        assert_eq!(env_of(&tmpl, 1), vec![("A".to_string(), Some("2".to_string()))]);
    }

    #[test]
    fn test_env_var_init_container() {
        let mut tmpl = template();
        EnvVarManager::new(&mut tmpl).add_env_var_to_init_container("init", var("B", "x"));

        let spec = tmpl.spec.unwrap();
        let init = &spec.init_containers.unwrap()[0];
        assert_eq!(init.env.as_ref().unwrap().len(), 1);
        assert!(spec.containers[0].env.is_none());
    }

    #[test]
    fn test_env_from_keyed_by_reference() {
        let cm = EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: "shared".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let secret = EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: "shared".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut tmpl = template();
        let mut manager = EnvFromManager::new(&mut tmpl);
        manager.add_env_from(cm.clone());
        manager.add_env_from(secret);
        manager.add_env_from(cm);

        let env_from = tmpl.spec.unwrap().containers[0].env_from.clone().unwrap();
        assert_eq!(env_from.len(), 2);
        assert_eq!(
            EnvFromKey::of(&env_from[0]),
            Some(EnvFromKey::ConfigMap("shared".to_string()))
        );
        assert_eq!(
            EnvFromKey::of(&env_from[1]),
            Some(EnvFromKey::Secret("shared".to_string()))
        );
    }

    #[test]
    fn test_env_from_without_reference_is_appended() {
        let prefixed = |prefix: &str| EnvFromSource {
            prefix: Some(prefix.to_string()),
            ..Default::default()
        };

        let mut tmpl = template();
        let mut manager = EnvFromManager::new(&mut tmpl);
        manager.add_env_from_to_container("agent", prefixed("A_"));
        manager
            .add_env_from_to_containers_with_merge(&["agent"], prefixed("B_"), error_on_merge_attempt)
            .unwrap();

        let env_from = tmpl.spec.unwrap().containers[0].env_from.clone().unwrap();
        let prefixes: Vec<_> = env_from.iter().map(|s| s.prefix.as_deref()).collect();
        assert_eq!(prefixes, vec![Some("A_"), Some("B_")]);
    }

    #[test]
    fn test_conflict_on_one_container_leaves_all_untouched() {
        let mut tmpl = template();
        EnvVarManager::new(&mut tmpl).add_env_var_to_container("trace", var("X", "1"));

        let err = EnvVarManager::new(&mut tmpl)
            .add_env_var_with_merge(var("X", "2"), error_on_merge_attempt)
            .unwrap_err();
        assert!(err.is_merge_attempted());

        assert!(env_of(&tmpl, 0).is_empty());
        assert_eq!(env_of(&tmpl, 1), vec![("X".to_string(), Some("1".to_string()))]);
    }

    #[test]
    fn test_env_from_conflict_leaves_all_untouched() {
        let source = |optional: bool| EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: "settings".to_string(),
                optional: Some(optional),
            }),
            ..Default::default()
        };

        let mut tmpl = template();
        EnvFromManager::new(&mut tmpl).add_env_from_to_container("trace", source(false));
        assert!(
            EnvFromManager::new(&mut tmpl)
                .add_env_from_with_merge(source(true), error_on_merge_attempt)
                .is_err()
        );

        let spec = tmpl.spec.unwrap();
        assert!(spec.containers[0].env_from.is_none());
        assert_eq!(spec.containers[1].env_from.as_ref().unwrap().len(), 1);
    }
}
