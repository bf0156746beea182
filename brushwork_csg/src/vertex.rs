// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU-facing vertex layouts.

#![allow(unsafe_code, reason = "bytemuck derives emit unsafe impls of Pod and Zeroable")]

use bytemuck::{Pod, Zeroable};

/// A vertex of the render stream.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderVertex {
    /// Tree-space position.
    pub position: [f32; 3],
    /// Tree-space unit normal, facing out of the visible side.
    pub normal: [f32; 3],
    /// Tangent along increasing u; `w` is the bitangent sign.
    pub tangent: [f32; 4],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

/// A vertex of the selection stream.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SelectionVertex {
    /// Tree-space position.
    pub position: [f32; 3],
    /// Slot of the brush node.
    pub brush: u32,
    /// Surface (plane) index within the brush.
    pub surface: u32,
}
