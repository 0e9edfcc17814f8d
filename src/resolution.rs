use std::{
    fmt::Display,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use log::debug;
use trust_dns_resolver::{
    config::ResolverOpts,
    error::{ResolveError, ResolveErrorKind},
    system_conf::read_system_conf,
    Resolver,
};

use crate::{pinging::ProbeError, target::Target};

/// Resolves a target to the socket address a probe should talk to.
///
/// IP literals skip the resolver entirely. Names are looked up with the
/// system resolver configuration, bounded by `timeout`, and the first address
/// wins.
pub fn resolve_target(target: &Target, timeout: Duration) -> Result<SocketAddr, ProbeError> {
    let host = target.hostname.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, target.port));
    }

    let failed = |e: &dyn Display| ProbeError::ConnectionFailed(format!("{}: {}", target, e));

    let (config, options) = read_system_conf().map_err(|e| failed(&e))?;
    let resolver =
        Resolver::new(config, lookup_options(options, timeout)).map_err(|e| failed(&e))?;
    let lookup = resolver.lookup_ip(host).map_err(|e| lookup_error(target, e))?;

    let address = lookup
        .iter()
        .next()
        .ok_or_else(|| failed(&format_args!("no addresses found for {}", host)))?;
    debug!("resolved {} to {}", host, address);

    Ok(SocketAddr::new(address, target.port))
}

/// Narrows the system resolver options so one lookup fits in the probe
/// timeout.
pub(crate) fn lookup_options(mut options: ResolverOpts, timeout: Duration) -> ResolverOpts {
    options.timeout = timeout;
    options.attempts = 1;
    options
}

fn lookup_error(target: &Target, err: ResolveError) -> ProbeError {
    match err.kind() {
        ResolveErrorKind::Timeout => ProbeError::Timeout,
        _ => ProbeError::ConnectionFailed(format!("{}: {}", target, err)),
    }
}
