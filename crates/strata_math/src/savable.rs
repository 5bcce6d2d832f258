//! Capsule field contract for the math value types

use strata_core::{
    read_savable_or, write_savable_or_skip, CapsuleError, InputCapsule, OutputCapsule, Result,
    Savable,
};

use crate::bounds::{BoundingBox, BoundingSphere, BoundingVolume};
use crate::color::ColorRgba;
use crate::line_segment::LineSegment;
use crate::plane::Plane;
use crate::quaternion::Quat;
use crate::ray::Ray;
use crate::transform::Transform;
use crate::triangle::Triangle;
use crate::vector::{Vec2, Vec3, Vec4};

const BOUNDING_BOX_CLASS: &str = "BoundingBox";
const BOUNDING_SPHERE_CLASS: &str = "BoundingSphere";

impl Savable for Vec2 {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_f32("x", self.x, 0.0);
        out.write_f32("y", self.y, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(input.read_f32("x", 0.0)?, input.read_f32("y", 0.0)?))
    }
}

impl Savable for Vec3 {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_f32("x", self.x, 0.0);
        out.write_f32("y", self.y, 0.0);
        out.write_f32("z", self.z, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            input.read_f32("x", 0.0)?,
            input.read_f32("y", 0.0)?,
            input.read_f32("z", 0.0)?,
        ))
    }
}

impl Savable for Vec4 {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_f32("x", self.x, 0.0);
        out.write_f32("y", self.y, 0.0);
        out.write_f32("z", self.z, 0.0);
        out.write_f32("w", self.w, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            input.read_f32("x", 0.0)?,
            input.read_f32("y", 0.0)?,
            input.read_f32("z", 0.0)?,
            input.read_f32("w", 0.0)?,
        ))
    }
}

impl Savable for Quat {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_f32("x", self.x, 0.0);
        out.write_f32("y", self.y, 0.0);
        out.write_f32("z", self.z, 0.0);
        out.write_f32("w", self.w, 1.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            input.read_f32("x", 0.0)?,
            input.read_f32("y", 0.0)?,
            input.read_f32("z", 0.0)?,
            input.read_f32("w", 1.0)?,
        ))
    }
}

impl Savable for Transform {
    fn write(&self, out: &mut dyn OutputCapsule) {
        write_savable_or_skip(out, "rot", &self.rotation, &Quat::IDENTITY);
        write_savable_or_skip(out, "translation", &self.translation, &Vec3::ZERO);
        write_savable_or_skip(out, "scale", &self.scale, &Vec3::ONE);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "translation", Vec3::ZERO)?,
            read_savable_or(input, "rot", Quat::IDENTITY)?,
            read_savable_or(input, "scale", Vec3::ONE)?,
        ))
    }
}

impl Savable for ColorRgba {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_f32("r", self.r, 0.0);
        out.write_f32("g", self.g, 0.0);
        out.write_f32("b", self.b, 0.0);
        out.write_f32("a", self.a, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            input.read_f32("r", 0.0)?,
            input.read_f32("g", 0.0)?,
            input.read_f32("b", 0.0)?,
            input.read_f32("a", 0.0)?,
        ))
    }
}

impl Savable for Plane {
    fn write(&self, out: &mut dyn OutputCapsule) {
        write_savable_or_skip(out, "normal", &self.normal, &Vec3::ZERO);
        out.write_f32("constant", self.constant, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "normal", Vec3::ZERO)?,
            input.read_f32("constant", 0.0)?,
        ))
    }
}

impl Savable for Triangle {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_savable("pointa", Some(&self.get(0)));
        out.write_savable("pointb", Some(&self.get(1)));
        out.write_savable("pointc", Some(&self.get(2)));
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "pointa", Vec3::ZERO)?,
            read_savable_or(input, "pointb", Vec3::ZERO)?,
            read_savable_or(input, "pointc", Vec3::ZERO)?,
        ))
    }
}

impl Savable for LineSegment {
    fn write(&self, out: &mut dyn OutputCapsule) {
        write_savable_or_skip(out, "origin", &self.origin, &Vec3::ZERO);
        write_savable_or_skip(out, "direction", &self.direction, &Vec3::ZERO);
        out.write_f32("extent", self.extent, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "origin", Vec3::ZERO)?,
            read_savable_or(input, "direction", Vec3::ZERO)?,
            input.read_f32("extent", 0.0)?,
        ))
    }
}

impl Savable for Ray {
    fn write(&self, out: &mut dyn OutputCapsule) {
        write_savable_or_skip(out, "origin", &self.origin, &Vec3::ZERO);
        write_savable_or_skip(out, "direction", &self.direction, &Vec3::Z);
        out.write_f32("limit", self.limit, f32::INFINITY);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "origin", Vec3::ZERO)?,
            read_savable_or(input, "direction", Vec3::Z)?,
        )
        .with_limit(input.read_f32("limit", f32::INFINITY)?))
    }
}

impl Savable for BoundingBox {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.set_class(BOUNDING_BOX_CLASS);
        write_savable_or_skip(out, "center", &self.center, &Vec3::ZERO);
        out.write_f32("xExtent", self.extent.x, 0.0);
        out.write_f32("yExtent", self.extent.y, 0.0);
        out.write_f32("zExtent", self.extent.z, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "center", Vec3::ZERO)?,
            Vec3::new(
                input.read_f32("xExtent", 0.0)?,
                input.read_f32("yExtent", 0.0)?,
                input.read_f32("zExtent", 0.0)?,
            ),
        ))
    }
}

impl Savable for BoundingSphere {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.set_class(BOUNDING_SPHERE_CLASS);
        write_savable_or_skip(out, "center", &self.center, &Vec3::ZERO);
        out.write_f32("radius", self.radius, 0.0);
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        Ok(Self::new(
            read_savable_or(input, "center", Vec3::ZERO)?,
            input.read_f32("radius", 0.0)?,
        ))
    }
}

impl Savable for BoundingVolume {
    fn write(&self, out: &mut dyn OutputCapsule) {
        match self {
            Self::Box(b) => b.write(out),
            Self::Sphere(s) => s.write(out),
        }
    }

    fn read(input: &dyn InputCapsule) -> Result<Self> {
        match input.class_name() {
            Some(BOUNDING_BOX_CLASS) => Ok(Self::Box(BoundingBox::read(input)?)),
            Some(BOUNDING_SPHERE_CLASS) => Ok(Self::Sphere(BoundingSphere::read(input)?)),
            other => Err(CapsuleError::InvalidValue {
                field: "class".into(),
                reason: format!("not a bounding volume: {:?}", other),
            }),
        }
    }
}
