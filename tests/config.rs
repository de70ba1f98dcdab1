// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use std::{fs, rc::Rc};

use cucumber_explorer::{
    config::{
        FileEvent, FileEventKind, FileWatch, JsonFileSettings, SettingsSource,
        SharedConfig,
    },
    runner::{ConfigLoader, Env},
    ConfigInstance, ConfigPipeline, Cucumber,
};
use tokio::task::LocalSet;

use self::common::{FakeProcess, ManualWatch, Spawned};

fn env(pairs: &[(&str, &str)]) -> Env {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[tokio::test]
async fn env_files_and_inline_vars_reach_the_runner() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("app")).unwrap();
    fs::write(
        dir.path().join("app/.env"),
        "# defaults\nGREETING=hello\nSHARED=file\n",
    )
    .unwrap();
    fs::write(dir.path().join("app/.env.local"), "SHARED=local\n").unwrap();

    let process = FakeProcess::new();
    let cucumber = Rc::new(Cucumber::with_process(process.clone()));
    let watch = ManualWatch::new();
    let instance = ConfigInstance::new(
        "app",
        dir.path(),
        SharedConfig {
            cwd: Some("app".into()),
            config_file: Some("config/cucumber.cjs".into()),
            env: Some(env(&[("INLINE", "1")])),
            env_files: Some(vec![".env".into(), ".env.local".into()]),
            profiles: Some(vec!["ci".into()]),
        },
        Rc::clone(&cucumber) as Rc<dyn ConfigLoader>,
        Rc::clone(&watch) as Rc<dyn FileWatch>,
    );

    let resolved = instance.cache_or_resolve().await.unwrap();

    let expected =
        env(&[("GREETING", "hello"), ("INLINE", "1"), ("SHARED", "local")]);
    assert_eq!(resolved.env.as_ref(), Some(&expected));
    assert_eq!(resolved.profiles, Some(vec!["ci".to_owned()]));

    let load = &process.commands()[0];
    assert_eq!(Spawned::of(load), Spawned::LoadConfig);
    assert_eq!(load.cwd, dir.path().join("app"));
    assert_eq!(load.env, expected);
    assert!(load.args[1].contains(r#""file":"config/cucumber.cjs""#));
    assert!(load.args[1].contains(r#""profiles":["ci"]"#));

    assert_eq!(
        watch.globs(),
        ["{config/cucumber.cjs,cucumber.json,cucumber.yaml,cucumber.yml,\
          cucumber.js,cucumber.cjs,cucumber.mjs,.env,.env.local}"],
    );
}

#[tokio::test]
async fn missing_env_file_fails_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let process = FakeProcess::new();
    let cucumber = Rc::new(Cucumber::with_process(process.clone()));
    let instance = ConfigInstance::new(
        "ws",
        dir.path(),
        SharedConfig {
            env_files: Some(vec!["absent.env".into()]),
            ..SharedConfig::default()
        },
        Rc::clone(&cucumber) as Rc<dyn ConfigLoader>,
        ManualWatch::new() as Rc<dyn FileWatch>,
    );

    let err = instance.cache_or_resolve().await.unwrap_err();

    assert!(err.to_string().contains("absent.env"), "{err}");
    assert!(process.commands().is_empty());
    assert!(instance.read().is_some_and(|r| r.is_err()));
}

#[tokio::test]
async fn settings_file_defines_virtual_folders() {
    LocalSet::new()
        .run_until(async {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir(dir.path().join(".vscode")).unwrap();
            fs::write(
                dir.path().join(".vscode/settings.json"),
                r#"{
                    "editor.tabSize": 2,
                    "cucumberJsTestExplorer.profiles": ["base"],
                    "cucumberJsTestExplorer": {
                        "env": {"SHARED": "main"},
                        "virtualFolders": [
                            {"name": "api", "cwd": "packages/api",
                             "profiles": ["api"]},
                            {"name": "web", "cwd": "packages/web",
                             "env": {"SHARED": "web"}}
                        ]
                    }
                }"#,
            )
            .unwrap();

            let settings = JsonFileSettings::default();
            assert_eq!(
                settings.watched_glob().as_deref(),
                Some(".vscode/settings.json"),
            );

            let watch = ManualWatch::new();
            let pipeline = ConfigPipeline::new(
                [dir.path().to_path_buf()],
                Rc::new(settings),
                Rc::new(Cucumber::with_process(FakeProcess::new()))
                    as Rc<dyn ConfigLoader>,
                Rc::clone(&watch) as Rc<dyn FileWatch>,
            );

            let instances = pipeline.instances().read().unwrap();
            let names =
                instances.iter().map(ConfigInstance::name).collect::<Vec<_>>();
            assert_eq!(names, ["api", "web"]);
            assert_eq!(
                instances[0].base_path(),
                dir.path().join("packages/api"),
            );
            assert_eq!(
                instances[0].config().profiles,
                Some(vec!["base".to_owned(), "api".to_owned()]),
            );
            assert_eq!(
                instances[1].config().env,
                Some(env(&[("SHARED", "web")])),
            );
            assert_eq!(watch.globs(), [".vscode/settings.json"]);

            fs::write(dir.path().join(".vscode/settings.json"), "{}").unwrap();
            watch.emit(
                ".vscode/settings.json",
                FileEvent {
                    kind: FileEventKind::Changed,
                    path: dir.path().join(".vscode/settings.json"),
                },
            );

            let reloaded = pipeline.instances().read().unwrap();
            assert_eq!(reloaded.len(), 1);
            assert_eq!(reloaded[0].base_path(), dir.path());
            assert!(instances.iter().all(ConfigInstance::is_disposed));

            pipeline.dispose();
            assert!(reloaded[0].is_disposed());
        })
        .await;
}
