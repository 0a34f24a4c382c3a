// ─── craftctl Core ───
// Server installation management, leaves first:
//
//   core/
//     backup/     — Root snapshots as zip/tar archives
//     cache/      — On-disk TTL key/value store
//     config/     — Versioned installation config + migrations
//     api/        — Build index, mod registry, Java index, player profiles
//     downloader/ — Transport seam + concurrent SHA-1 validated downloads
//     install/    — Installation scripts and the segment runner
//     jar/        — Jar identity via hash lookup
//     modpack/    — mrpack manifests and the modpack installer
//     mods/       — Mod resolution, install, update
//     java/       — Managed Java runtimes
//     launch/     — Server process, foreground or detached
//     query/      — Server List Ping and full UDP query
//     profile/    — Named installations sharing one root
//     context.rs  — Explicit per-invocation context

pub mod api;
pub mod backup;
pub mod cache;
pub mod config;
pub mod context;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod jar;
pub mod java;
pub mod launch;
pub mod modpack;
pub mod mods;
pub mod paths;
pub mod profile;
pub mod query;
