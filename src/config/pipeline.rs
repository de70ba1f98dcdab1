// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Mapping of workspace roots onto [`ConfigInstance`]s.

use std::{
    cell::RefCell,
    fmt,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    pubsub::{DisposeBag, Publisher},
    runner::ConfigLoader,
};

use super::{
    merge_into_virtual_folder, ConfigInstance, FileEvent, FileWatch,
    MainConfig, SettingsSource,
};

struct Inner {
    workspaces: Vec<PathBuf>,
    settings: Rc<dyn SettingsSource>,
    loader: Rc<dyn ConfigLoader>,
    watch: Rc<dyn FileWatch>,
    instances: Publisher<Vec<ConfigInstance>>,
    watchers: RefCell<DisposeBag>,
}

/// Publisher of the [`ConfigInstance`]s of all the workspace roots.
///
/// A workspace root without virtual folders gets a single
/// [`ConfigInstance`] named after its directory. Otherwise, every virtual
/// folder gets its own one, with the settings of the root merged in.
#[derive(Clone)]
pub struct ConfigPipeline(Rc<Inner>);

impl ConfigPipeline {
    /// Creates a new [`ConfigPipeline`] of the given `workspaces` roots,
    /// publishing their [`ConfigInstance`]s right away.
    ///
    /// If the `settings` are read from files, those are watched and any
    /// change of them [reloads](ConfigPipeline::reload) the pipeline, which
    /// requires a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn new(
        workspaces: impl IntoIterator<Item = PathBuf>,
        settings: Rc<dyn SettingsSource>,
        loader: Rc<dyn ConfigLoader>,
        watch: Rc<dyn FileWatch>,
    ) -> Self {
        let this = Self(Rc::new(Inner {
            workspaces: workspaces.into_iter().collect(),
            settings,
            loader,
            watch,
            instances: Publisher::new(),
            watchers: RefCell::new(DisposeBag::new()),
        }));
        this.reload();

        if let Some(glob) = this.0.settings.watched_glob() {
            for workspace in &this.0.workspaces {
                let weak = Rc::downgrade(&this.0);
                let on_event = Rc::new(move |_: FileEvent| {
                    if let Some(inner) = weak.upgrade() {
                        tracing::info!("settings changed");
                        Self(inner).reload();
                    }
                });
                match this.0.watch.watch(workspace, &glob, on_event) {
                    Ok(w) => this.0.watchers.borrow_mut().add(w),
                    Err(e) => tracing::warn!(
                        workspace = %workspace.display(),
                        "{e}",
                    ),
                }
            }
        }
        this
    }

    /// Returns the [`Publisher`] of the current [`ConfigInstance`]s.
    #[must_use]
    pub fn instances(&self) -> Publisher<Vec<ConfigInstance>> {
        self.0.instances.clone()
    }

    /// Re-reads the settings, disposing every previous [`ConfigInstance`]
    /// and publishing a fresh set.
    pub fn reload(&self) {
        let fresh = self
            .0
            .workspaces
            .iter()
            .flat_map(|ws| self.instances_of(ws))
            .collect::<Vec<_>>();
        tracing::debug!(count = fresh.len(), "config instances reloaded");

        for old in self.0.instances.read().into_iter().flatten() {
            old.dispose();
        }
        self.0.instances.next(fresh);
    }

    /// Disposes the current [`ConfigInstance`]s and stops watching the
    /// settings.
    pub fn dispose(&self) {
        self.0.watchers.borrow_mut().dispose();
        for instance in self.0.instances.read().into_iter().flatten() {
            instance.dispose();
        }
    }

    fn instances_of(&self, workspace: &Path) -> Vec<ConfigInstance> {
        let settings = self.0.settings.read(workspace).unwrap_or_else(|e| {
            tracing::error!(workspace = %workspace.display(), "{e}");
            MainConfig::default()
        });

        let instance = |name: String, config| {
            ConfigInstance::new(
                name,
                workspace,
                config,
                Rc::clone(&self.0.loader),
                Rc::clone(&self.0.watch),
            )
        };
        match &settings.virtual_folders {
            None => {
                let name = workspace.file_name().map_or_else(
                    || workspace.display().to_string(),
                    |n| n.to_string_lossy().into_owned(),
                );
                vec![instance(name, settings.config.clone())]
            }
            Some(folders) => folders
                .iter()
                .map(|folder| {
                    let merged =
                        merge_into_virtual_folder(&settings, &folder.config);
                    instance(folder.name.clone(), merged)
                })
                .collect(),
        }
    }
}

impl fmt::Debug for ConfigPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPipeline")
            .field("workspaces", &self.0.workspaces)
            .field("instances", &self.0.instances.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, rc::Rc};

    use crate::{
        config::{
            FileWatch, MainConfig, NotifyWatch, SharedConfig, StaticSettings,
            VirtualFolder,
        },
        runner::{ConfigLoader, Cucumber},
    };

    use super::ConfigPipeline;

    fn pipeline(settings: StaticSettings) -> ConfigPipeline {
        ConfigPipeline::new(
            [PathBuf::from("/ws/shop")],
            Rc::new(settings),
            Rc::new(Cucumber::new()) as Rc<dyn ConfigLoader>,
            Rc::new(NotifyWatch) as Rc<dyn FileWatch>,
        )
    }

    #[test]
    fn single_instance_named_after_directory() {
        let pipeline = pipeline(StaticSettings::default());

        let instances = pipeline.instances().read().unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name(), "shop");
        assert_eq!(instances[0].base_path(), PathBuf::from("/ws/shop"));
    }

    #[test]
    fn instance_per_virtual_folder() {
        let settings = MainConfig {
            config: SharedConfig {
                profiles: Some(vec!["default".into()]),
                ..SharedConfig::default()
            },
            virtual_folders: Some(vec![
                VirtualFolder {
                    name: "api".into(),
                    config: SharedConfig {
                        cwd: Some("api".into()),
                        ..SharedConfig::default()
                    },
                },
                VirtualFolder {
                    name: "web".into(),
                    config: SharedConfig {
                        cwd: Some("web".into()),
                        profiles: Some(vec!["web".into()]),
                        ..SharedConfig::default()
                    },
                },
            ]),
        };
        let pipeline = pipeline(StaticSettings::new(settings));

        let instances = pipeline.instances().read().unwrap();

        let names = instances.iter().map(|i| i.name()).collect::<Vec<_>>();
        assert_eq!(names, ["api", "web"]);
        assert_eq!(instances[1].base_path(), PathBuf::from("/ws/shop/web"));
        assert_eq!(
            instances[1].config().profiles,
            Some(vec!["default".into(), "web".into()]),
        );
    }

    #[test]
    fn reload_disposes_previous_instances() {
        let pipeline = pipeline(StaticSettings::default());
        let before = pipeline.instances().read().unwrap();

        pipeline.reload();

        let after = pipeline.instances().read().unwrap();
        assert!(before[0].is_disposed());
        assert!(!after[0].is_disposed());
        assert_ne!(before[0], after[0]);

        pipeline.dispose();
        assert!(after[0].is_disposed());
    }
}
