//! Gameplay modules: entities, aim, fire control, hit resolution and damage

pub mod aim;
pub mod character;
pub mod damage;
pub mod entity;
pub mod events;
pub mod fire;
pub mod hit;
pub mod math;
pub mod projectile;
pub mod weapon;
pub mod world;
