//! Purpose: Hold top-level CLI command dispatch for `benchtop`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Command behavior, output envelopes, and exit code semantics stay stable.
//! Invariants: Helpers in `main.rs` remain the source of parsing and emission logic.

use super::*;

pub(super) fn dispatch_command(command: Command, root_dir: PathBuf) -> Result<RunOutcome, Error> {
    let client = LocalClient::new().with_root_dir(&root_dir);
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "benchtop", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_output(&json!({
                "name": "benchtop",
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Env { command } => dispatch_env_command(command, &client),
        Command::Run { command } => dispatch_run_command(command, &client),
    }
}

fn dispatch_env_command(command: EnvCommand, client: &LocalClient) -> Result<RunOutcome, Error> {
    match command {
        EnvCommand::Create { name, packages } => {
            let packages = parse_package_args(&packages)?;
            let (env, path) = client.create_env(&name, packages)?;
            if env.package_set().is_empty() {
                emit_notice(&empty_package_set_notice("create", &env));
            }
            emit_output(&json!({"created": env_json(&env, &path)}));
            Ok(RunOutcome::ok())
        }
        EnvCommand::Show { env } => {
            let (env, path) = client.open_env(&parse_env_ref(&env))?;
            emit_output(&env_json(&env, &path));
            Ok(RunOutcome::ok())
        }
        EnvCommand::Add { env, packages } => {
            let packages = parse_package_args(&packages)?;
            let (mut env, path) = client.open_env(&parse_env_ref(&env))?;
            for package in packages {
                env.add_package(package);
            }
            client.save_env(&path, &env)?;
            emit_output(&env_json(&env, &path));
            Ok(RunOutcome::ok())
        }
        EnvCommand::Remove { env, packages } => {
            let packages = parse_package_args(&packages)?;
            let (mut env, path) = client.open_env(&parse_env_ref(&env))?;
            for package in &packages {
                env.remove_package(package)?;
            }
            client.save_env(&path, &env)?;
            if env.package_set().is_empty() {
                emit_notice(&empty_package_set_notice("remove", &env));
            }
            emit_output(&env_json(&env, &path));
            Ok(RunOutcome::ok())
        }
        EnvCommand::Eval { env, catalog } => {
            let (env, _path) = client.open_env(&parse_env_ref(&env))?;
            match catalog {
                Some(catalog_path) => {
                    let catalog = client.load_catalog(&catalog_path)?;
                    let resolution = catalog.resolve(&env)?;
                    emit_output(&resolution_json(&resolution));
                }
                None => emit_output(&package_set_json(&env)),
            }
            Ok(RunOutcome::ok())
        }
        EnvCommand::List => {
            let environments: Vec<Value> = client
                .list_envs()?
                .iter()
                .map(|(env, path)| env_json(env, path))
                .collect();
            emit_output(&json!({"environments": environments}));
            Ok(RunOutcome::ok())
        }
        EnvCommand::Doctor { env } => {
            let report = client.doctor_env(&parse_env_ref(&env))?;
            emit_output(&report_json(&report));
            match report.status {
                ValidationStatus::Ok => Ok(RunOutcome::ok()),
                ValidationStatus::Invalid => {
                    Ok(RunOutcome::with_code(to_exit_code(ErrorKind::Corrupt)))
                }
            }
        }
    }
}

fn dispatch_run_command(command: RunCommand, client: &LocalClient) -> Result<RunOutcome, Error> {
    match command {
        RunCommand::New { label, env, source } => {
            // --env must name a real manifest; its canonical name is recorded.
            let environment = match env {
                Some(env) => {
                    let (env, _path) = client.open_env(&parse_env_ref(&env))?;
                    Some(env.name)
                }
                None => None,
            };
            let run = client.create_run(
                &label,
                RunOptions {
                    environment,
                    source,
                },
            )?;
            emit_output(&run_json(&run));
            Ok(RunOutcome::ok())
        }
        RunCommand::Record { dir, params } => {
            let mut run = client.open_run(&dir)?;
            for param in &params {
                let (key, value) = parse_param_arg(param)?;
                run.record(key, value);
            }
            run.save_params()?;
            emit_output(&run_json(&run));
            Ok(RunOutcome::ok())
        }
        RunCommand::Path {
            dir,
            relative,
            no_create,
        } => {
            let run = client.open_run(&dir)?;
            let path = run.path(&relative, !no_create)?;
            emit_output(&json!({"path": path.display().to_string()}));
            Ok(RunOutcome::ok())
        }
        RunCommand::Show { dir } => {
            let run = client.open_run(&dir)?;
            emit_output(&run_json(&run));
            Ok(RunOutcome::ok())
        }
        RunCommand::List { label } => {
            let runs: Vec<String> = client
                .list_runs(&label)?
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            emit_output(&json!({"label": label, "runs": runs}));
            Ok(RunOutcome::ok())
        }
    }
}
