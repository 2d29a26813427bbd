use clap::builder::PossibleValue;
use clap::{Arg, ArgAction, Command, crate_authors, crate_description, crate_name, crate_version};

pub fn build_cli() -> Command {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("WEBHOOK_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("WEBHOOK_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("address")
            .long("addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("WEBHOOK_BIND_ADDRESS")
            .help("Bind against ADDRESS"),
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .default_value("8443")
            .env("WEBHOOK_PORT")
            .help("Webhook server port"),
        Arg::new("tls-cert-file")
            .long("tls-cert-file")
            .value_name("CERT_FILE")
            .default_value("/etc/webhook/certs/tls.crt")
            .env("WEBHOOK_TLS_CERT_FILE")
            .help("File containing the x509 certificate for HTTPS, empty to serve plain HTTP"),
        Arg::new("tls-key-file")
            .long("tls-key-file")
            .value_name("KEY_FILE")
            .default_value("/etc/webhook/certs/tls.key")
            .env("WEBHOOK_TLS_KEY_FILE")
            .help("File containing the x509 private key matching --tls-cert-file"),
        Arg::new("mutation-timeout")
            .long("mutation-timeout")
            .env("WEBHOOK_MUTATION_TIMEOUT")
            .value_name("MAXIMUM_EXECUTION_TIME_SECONDS")
            .default_value("2")
            .help("Admit the pod unchanged when computing the patch takes longer than this"),
        Arg::new("disable-timeout-protection")
            .long("disable-timeout-protection")
            .env("WEBHOOK_DISABLE_TIMEOUT_PROTECTION")
            .action(ArgAction::SetTrue)
            .help("Disable the mutation timeout"),
        Arg::new("use-kubeconfig")
            .long("use-kubeconfig")
            .env("USE_KUBECONFIG")
            .action(ArgAction::SetTrue)
            .help("Read cluster credentials from a kubeconfig file instead of the in-cluster service account"),
        Arg::new("kubeconfig")
            .long("kubeconfig")
            .value_name("KUBECONFIG")
            .env("KUBECONFIG")
            .help("Path to the kubeconfig file, defaults to $HOME/.kube/config"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
