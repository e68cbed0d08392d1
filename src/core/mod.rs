// ─── Packsmith Core ───
// Provisioning engine for game versions and modpacks.
//
// Layout:
//   core/
//     task/       — Task graph: phases, failure policies, progress
//     downloader/ — Mirrored, verified, cached downloads
//     version/    — Version descriptors, patches, remote manifest
//     repository/ — On-disk game repository
//     loaders/    — Vanilla, Fabric, Quilt, Forge, NeoForge
//     install/    — Building a version from its loader declarations
//     modpack/    — Curse, Modrinth, MultiMC and mcbbs packs
//     datapack/   — World datapacks
//     state/      — Settings and the shared install environment

pub mod cache;
pub mod datapack;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod integrity;
pub mod loaders;
pub mod maven;
pub mod modpack;
pub mod repository;
pub mod state;
pub mod task;
pub mod version;
